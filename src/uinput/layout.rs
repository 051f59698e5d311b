//! # Gamepad Layout
//!
//! Which gamepad codes the virtual device declares, and how each Wii Remote
//! key maps onto them for a given orientation.
//!
//! ## Orientation
//!
//! In **portrait** the remote is held upright and the d-pad maps directly.
//! In **landscape** the remote is held sideways with the d-pad on the left,
//! so the pad is rotated by 90°:
//!
//! | Wii key | Portrait | Landscape |
//! |---------|----------|-----------|
//! | Up | BTN_DPAD_UP | BTN_DPAD_LEFT |
//! | Down | BTN_DPAD_DOWN | BTN_DPAD_RIGHT |
//! | Left | BTN_DPAD_LEFT | BTN_DPAD_DOWN |
//! | Right | BTN_DPAD_RIGHT | BTN_DPAD_UP |
//!
//! The remaining keys map identically in both orientations.

use clap::ValueEnum;
use evdev::{AbsoluteAxisType, Key};
use serde::Deserialize;

use crate::config::GamepadConfig;
use crate::controller::events::{WiiKey, WII_KEY_COUNT};

/// Name of the core interface of the Wii Remote driver.
pub const WIIMOTE_CORE_NAME: &str = "Nintendo Wii Remote";

/// Suffix appended to the virtual device name.
pub const GAMEPAD_MODE_SUFFIX: &str = " in gamepad mode";

/// D-pad orientation, fixed per device at association time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Remote held sideways, d-pad on the left.
    #[default]
    #[serde(alias = "land")]
    #[value(alias = "land")]
    Landscape,
    /// Remote held upright.
    #[serde(alias = "port")]
    #[value(alias = "port")]
    Portrait,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::Portrait => write!(f, "portrait"),
        }
    }
}

/// Declared range of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSpec {
    pub axis: AbsoluteAxisType,
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

impl AxisSpec {
    /// Saturating clip into `[min, max]`.
    #[inline]
    #[must_use]
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

/// Complete description of one virtual gamepad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamepadLayout {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub orientation: Orientation,
    /// Output code per Wii key, indexed by [`WiiKey::code`].
    pub buttons: [Key; WII_KEY_COUNT],
    /// First axis (vertical sensor axis, inverted) then second axis.
    pub axes: [AxisSpec; 2],
    /// Whether the second axis takes the negated horizontal reading.
    pub invert_horizontal: bool,
}

impl GamepadLayout {
    /// Builds the layout for one device.
    ///
    /// # Examples
    ///
    /// ```
    /// use wiimote_pad::config::GamepadConfig;
    /// use wiimote_pad::controller::events::WiiKey;
    /// use wiimote_pad::uinput::layout::{GamepadLayout, Orientation};
    /// use evdev::Key;
    ///
    /// let layout = GamepadLayout::new(&GamepadConfig::default(), Orientation::Landscape);
    /// assert_eq!(layout.button(WiiKey::Up), Key::BTN_DPAD_LEFT);
    /// ```
    #[must_use]
    pub fn new(config: &GamepadConfig, orientation: Orientation) -> Self {
        let axis = |axis| AxisSpec {
            axis,
            min: -config.axis_max,
            max: config.axis_max,
            fuzz: config.axis_fuzz,
            flat: config.axis_flat,
        };

        Self {
            name: format!("{}{}", WIIMOTE_CORE_NAME, GAMEPAD_MODE_SUFFIX),
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            orientation,
            buttons: WiiKey::ALL.map(|key| button_code(key, orientation)),
            axes: [axis(AbsoluteAxisType::ABS_X), axis(AbsoluteAxisType::ABS_Y)],
            invert_horizontal: config.invert_horizontal,
        }
    }

    /// Output code for a Wii key.
    #[must_use]
    pub fn button(&self, key: WiiKey) -> Key {
        self.buttons[key.code() as usize]
    }
}

/// Gamepad code a Wii key reports under an orientation.
#[must_use]
pub fn button_code(key: WiiKey, orientation: Orientation) -> Key {
    match (key, orientation) {
        (WiiKey::Up, Orientation::Portrait) => Key::BTN_DPAD_UP,
        (WiiKey::Down, Orientation::Portrait) => Key::BTN_DPAD_DOWN,
        (WiiKey::Left, Orientation::Portrait) => Key::BTN_DPAD_LEFT,
        (WiiKey::Right, Orientation::Portrait) => Key::BTN_DPAD_RIGHT,

        (WiiKey::Up, Orientation::Landscape) => Key::BTN_DPAD_LEFT,
        (WiiKey::Down, Orientation::Landscape) => Key::BTN_DPAD_RIGHT,
        (WiiKey::Left, Orientation::Landscape) => Key::BTN_DPAD_DOWN,
        (WiiKey::Right, Orientation::Landscape) => Key::BTN_DPAD_UP,

        (WiiKey::A, _) => Key::BTN_SOUTH,
        (WiiKey::B, _) => Key::BTN_EAST,
        (WiiKey::Plus, _) => Key::BTN_TL,
        (WiiKey::Minus, _) => Key::BTN_TR,
        (WiiKey::Home, _) => Key::BTN_MODE,
        (WiiKey::One, _) => Key::BTN_1,
        (WiiKey::Two, _) => Key::BTN_2,
    }
}
