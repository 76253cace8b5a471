use std::path::PathBuf;
use std::str::FromStr;

use crate::render::color::ColorTheme;
use crate::render::renderers::VisType;

/// A user-control event, as typed on stdin in interactive mode.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    Load(PathBuf),
    Play,
    Pause,
    TogglePlay,
    ToggleMic,
    Style(VisType),
    Theme(ColorTheme),
    Sensitivity(f32),
    Volume(f32),
    /// Analysis transform size; the bin count is half of it.
    Resolution(usize),
    Capture,
    Status,
    Quit,
}

pub const HELP: &str = "commands: load <path> | play | pause | toggle | mic | \
style <bars|circles|particles> | theme <spectrum|gradient|monochrome|default> | gain <s> | \
volume <0-1> | fft <32-32768> | capture | status | quit";

impl FromStr for Control {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        let need_arg = |what: &str| require(command, arg, what);

        match command.to_ascii_lowercase().as_str() {
            "load" | "open" => Ok(Control::Load(PathBuf::from(need_arg("a file path")?))),
            "play" => Ok(Control::Play),
            "pause" => Ok(Control::Pause),
            "toggle" | "p" => Ok(Control::TogglePlay),
            "mic" | "microphone" => Ok(Control::ToggleMic),
            "style" | "vis" => need_arg("a style")?.parse().map(Control::Style),
            "theme" | "color" => need_arg("a theme")?.parse().map(Control::Theme),
            "gain" | "sensitivity" => {
                let value: f32 = need_arg("a number")?
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", arg))?;
                if !value.is_finite() || value <= 0.0 {
                    return Err("sensitivity must be greater than zero".into());
                }
                Ok(Control::Sensitivity(value))
            }
            "volume" | "vol" => {
                let value: f32 = need_arg("a number")?
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", arg))?;
                Ok(Control::Volume(value))
            }
            "fft" | "resolution" => {
                let value: usize = need_arg("a transform size")?
                    .parse()
                    .map_err(|_| format!("'{}' is not a whole number", arg))?;
                Ok(Control::Resolution(value))
            }
            "capture" | "save" | "snap" => Ok(Control::Capture),
            "status" => Ok(Control::Status),
            "quit" | "exit" | "q" => Ok(Control::Quit),
            "" => Err("empty command".into()),
            other => Err(format!("unknown command '{}'; {}", other, HELP)),
        }
    }
}

fn require<'a>(command: &str, arg: &'a str, what: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("'{}' needs {}", command, what))
    } else {
        Ok(arg)
    }
}
