use std::process::Command;
use std::time::Duration;

/// Placeholder in decoder arguments that is replaced with the track's media source.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// External decoder invocation: program plus arguments.
///
/// The decoder must write an Ogg/Opus stream to stdout. Any argument containing
/// [`INPUT_PLACEHOLDER`] has it substituted with the media source of the track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DecoderCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `ffmpeg` transcoding any input to 48 kHz stereo Opus in an Ogg container.
    pub fn ffmpeg_opus() -> Self {
        Self::new(
            "ffmpeg",
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                INPUT_PLACEHOLDER,
                "-vn",
                "-map",
                "0:a",
                "-c:a",
                "libopus",
                "-b:a",
                "64k",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-f",
                "ogg",
                "-",
            ],
        )
    }

    /// Arguments with the input placeholder substituted.
    pub fn resolved_args(&self, input: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, input))
            .collect()
    }

    pub(crate) fn command(&self, input: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.resolved_args(input));
        cmd
    }
}

impl Default for DecoderCommand {
    fn default() -> Self {
        Self::ffmpeg_opus()
    }
}

/// Timing and sizing knobs shared by the controller, decode and transport stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Capacity of the bounded frame queue between decode and transport (frames).
    pub frame_queue_capacity: usize,
    /// Leading container packets dropped per track (OpusHead + OpusTags).
    pub skip_leading_frames: usize,
    /// Max wait for the voice connection to report ready.
    pub ready_timeout: Duration,
    /// Readiness poll interval.
    pub ready_poll_interval: Duration,
    /// Transport gives up on the session after this long without a frame.
    pub idle_timeout: Duration,
    /// Max time the transport may take to accept a single frame.
    pub send_timeout: Duration,
    /// Poll interval while the queue is empty.
    pub empty_queue_poll: Duration,
    pub decoder: DecoderCommand,
}

impl Default for PlayerConfig {
    /// Defaults matching a 20 ms Opus frame cadence.
    fn default() -> Self {
        Self {
            frame_queue_capacity: 64,
            skip_leading_frames: 2,
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(120),
            send_timeout: Duration::from_secs(1),
            empty_queue_poll: Duration::from_millis(500),
            decoder: DecoderCommand::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_substituted_in_every_argument() {
        let cmd = DecoderCommand::new("dec", ["--in={input}", "-o", "-", "{input}"]);
        assert_eq!(
            cmd.resolved_args("/a b.ogg"),
            vec!["--in=/a b.ogg", "-o", "-", "/a b.ogg"]
        );
    }

    #[test]
    fn default_decoder_emits_ogg_to_stdout() {
        let args = DecoderCommand::default().resolved_args("song.webm");
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "song.webm"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn default_timings() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.frame_queue_capacity, 64);
        assert_eq!(cfg.skip_leading_frames, 2);
        assert_eq!(cfg.ready_timeout, Duration::from_secs(60));
        assert_eq!(cfg.idle_timeout, Duration::from_secs(120));
        assert_eq!(cfg.send_timeout, Duration::from_secs(1));
    }
}
