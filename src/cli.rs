//! # Command Line
//!
//! Device nodes may be interleaved with `--dpad` directives. Each node takes
//! the orientation of the closest `--dpad` before it, or the configured
//! default when there is none:
//!
//! ```text
//! wiimote-pad /dev/input/js0 --dpad port /dev/input/js1 /dev/input/js2
//! #           landscape                  portrait       portrait
//! ```
//!
//! With no device nodes the remotes are discovered, and all of them use the
//! last orientation given.

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::bridge::lifecycle::DeviceSpec;
use crate::uinput::layout::Orientation;

/// Expose Wii Remotes as ordinary gamepads
#[derive(Parser, Debug)]
#[command(name = "wiimote-pad", version, about)]
pub struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// D-pad orientation for the devices that follow
    #[arg(long, value_enum, value_name = "ORIENTATION")]
    pub dpad: Vec<Orientation>,

    /// Joystick device nodes; discovered when omitted
    #[arg(value_name = "DEVICE")]
    pub devices: Vec<PathBuf>,
}

/// Parsed command line, keeping argument positions.
#[derive(Debug)]
pub struct Invocation {
    pub args: Args,
    matches: ArgMatches,
}

/// Devices to associate and the orientation left in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub devices: Vec<DeviceSpec>,
    pub orientation: Orientation,
}

impl Invocation {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        let matches = Args::command().get_matches();
        Self::from_matches(matches).unwrap_or_else(|e| e.exit())
    }

    /// Parses an explicit argument list
    ///
    /// # Errors
    ///
    /// Returns the clap error for unknown flags or orientation values.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::from_matches(Args::command().try_get_matches_from(args)?)
    }

    fn from_matches(matches: ArgMatches) -> Result<Self, clap::Error> {
        let args = Args::from_arg_matches(&matches)?;
        Ok(Self { args, matches })
    }

    /// Resolve the orientation of every named device
    ///
    /// # Arguments
    ///
    /// * `default` - Orientation before any `--dpad`
    ///
    /// # Examples
    ///
    /// ```
    /// use wiimote_pad::cli::Invocation;
    /// use wiimote_pad::uinput::layout::Orientation;
    ///
    /// let cli = Invocation::try_parse_from(["wiimote-pad", "--dpad", "port", "/dev/input/js0"])?;
    /// let selection = cli.selection(Orientation::Landscape);
    /// assert_eq!(selection.devices[0].orientation, Orientation::Portrait);
    /// # Ok::<(), clap::Error>(())
    /// ```
    pub fn selection(&self, default: Orientation) -> Selection {
        let directives = positioned::<Orientation>(&self.matches, "dpad");
        let paths = positioned::<PathBuf>(&self.matches, "devices");

        let mut orientation = default;
        let mut devices = Vec::with_capacity(paths.len());
        let mut directives = directives.into_iter().peekable();

        for (index, path) in paths {
            while let Some((_, next)) = directives.next_if(|(at, _)| *at < index) {
                orientation = next;
            }
            devices.push(DeviceSpec::new(path, orientation));
        }
        if let Some((_, last)) = directives.last() {
            orientation = last;
        }

        Selection {
            devices,
            orientation,
        }
    }
}

fn positioned<T>(matches: &ArgMatches, id: &str) -> Vec<(usize, T)>
where
    T: Clone + Send + Sync + 'static,
{
    match (matches.indices_of(id), matches.get_many::<T>(id)) {
        (Some(indices), Some(values)) => indices.zip(values.cloned()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(args: &[&str], default: Orientation) -> Selection {
        let mut argv = vec!["wiimote-pad"];
        argv.extend_from_slice(args);
        Invocation::try_parse_from(argv).unwrap().selection(default)
    }

    fn orientations(selection: &Selection) -> Vec<Orientation> {
        selection.devices.iter().map(|d| d.orientation).collect()
    }

    // ==================== Orientation Tests ====================

    #[test]
    fn test_default_applies_without_directive() {
        let sel = selection(&["/dev/input/js0", "/dev/input/js1"], Orientation::Landscape);
        assert_eq!(
            orientations(&sel),
            vec![Orientation::Landscape, Orientation::Landscape]
        );
        assert_eq!(sel.devices[1].path, PathBuf::from("/dev/input/js1"));
    }

    #[test]
    fn test_directive_applies_to_following_devices() {
        let sel = selection(
            &["/dev/input/js0", "--dpad", "port", "/dev/input/js1", "/dev/input/js2"],
            Orientation::Landscape,
        );
        assert_eq!(
            orientations(&sel),
            vec![
                Orientation::Landscape,
                Orientation::Portrait,
                Orientation::Portrait
            ]
        );
    }

    #[test]
    fn test_later_directive_does_not_change_earlier_devices() {
        let sel = selection(
            &[
                "--dpad",
                "portrait",
                "/dev/input/js0",
                "--dpad",
                "land",
                "/dev/input/js1",
            ],
            Orientation::Landscape,
        );
        assert_eq!(
            orientations(&sel),
            vec![Orientation::Portrait, Orientation::Landscape]
        );
    }

    #[test]
    fn test_trailing_directive_sets_discovery_orientation() {
        let sel = selection(&["--dpad", "port"], Orientation::Landscape);
        assert!(sel.devices.is_empty());
        assert_eq!(sel.orientation, Orientation::Portrait);
    }

    #[test]
    fn test_consecutive_directives_last_wins() {
        let sel = selection(
            &["--dpad", "port", "--dpad", "landscape", "/dev/input/js0"],
            Orientation::Portrait,
        );
        assert_eq!(orientations(&sel), vec![Orientation::Landscape]);
    }

    #[test]
    fn test_configured_default_is_seed() {
        let sel = selection(&["/dev/input/js0"], Orientation::Portrait);
        assert_eq!(orientations(&sel), vec![Orientation::Portrait]);
        assert_eq!(sel.orientation, Orientation::Portrait);
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_no_arguments() {
        let cli = Invocation::try_parse_from(["wiimote-pad"]).unwrap();
        assert!(cli.args.devices.is_empty());
        assert!(cli.args.config.is_none());
        assert_eq!(cli.selection(Orientation::Landscape).orientation, Orientation::Landscape);
    }

    #[test]
    fn test_config_flag() {
        let cli = Invocation::try_parse_from(["wiimote-pad", "--config", "/etc/wiimote-pad.toml"])
            .unwrap();
        assert_eq!(cli.args.config, Some(PathBuf::from("/etc/wiimote-pad.toml")));
    }

    #[test]
    fn test_invalid_orientation_rejected() {
        let result = Invocation::try_parse_from(["wiimote-pad", "--dpad", "sideways"]);
        assert!(result.is_err(), "unknown orientation must be rejected");
    }
}
