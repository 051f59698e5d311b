//! # Wii Remote Events
//!
//! Tagged events produced by a physical Wii Remote, and the mapping from the
//! kernel driver's key codes to the controller's logical key indices.
//!
//! ## Key Indices
//!
//! | Key | Index | Kernel code |
//! |-----|-------|-------------|
//! | Left | 0 | KEY_LEFT |
//! | Right | 1 | KEY_RIGHT |
//! | Up | 2 | KEY_UP |
//! | Down | 3 | KEY_DOWN |
//! | A | 4 | BTN_A |
//! | B | 5 | BTN_B |
//! | Plus | 6 | KEY_NEXT |
//! | Minus | 7 | KEY_PREVIOUS |
//! | Home | 8 | BTN_MODE |
//! | One | 9 | BTN_1 |
//! | Two | 10 | BTN_2 |

use evdev::Key;

/// Number of keys on the Wii Remote core.
pub const WII_KEY_COUNT: usize = 11;

/// Logical Wii Remote keys, in controller library order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WiiKey {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Plus = 6,
    Minus = 7,
    Home = 8,
    One = 9,
    Two = 10,
}

impl WiiKey {
    /// All keys, indexed by their code.
    pub const ALL: [WiiKey; WII_KEY_COUNT] = [
        WiiKey::Left,
        WiiKey::Right,
        WiiKey::Up,
        WiiKey::Down,
        WiiKey::A,
        WiiKey::B,
        WiiKey::Plus,
        WiiKey::Minus,
        WiiKey::Home,
        WiiKey::One,
        WiiKey::Two,
    ];

    /// Logical index of this key.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a key by logical index.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Maps a key code reported by the core input node of the kernel driver.
    ///
    /// Returns `None` for codes the core interface never reports.
    #[must_use]
    pub fn from_kernel(key: Key) -> Option<Self> {
        match key {
            Key::KEY_LEFT => Some(WiiKey::Left),
            Key::KEY_RIGHT => Some(WiiKey::Right),
            Key::KEY_UP => Some(WiiKey::Up),
            Key::KEY_DOWN => Some(WiiKey::Down),
            Key::BTN_SOUTH => Some(WiiKey::A),
            Key::BTN_EAST => Some(WiiKey::B),
            Key::KEY_NEXT => Some(WiiKey::Plus),
            Key::KEY_PREVIOUS => Some(WiiKey::Minus),
            Key::BTN_MODE => Some(WiiKey::Home),
            Key::BTN_1 => Some(WiiKey::One),
            Key::BTN_2 => Some(WiiKey::Two),
            _ => None,
        }
    }
}

/// One event dispatched from a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiiEvent {
    /// Key state change. `state` is passed through unchecked: 0 released,
    /// 1 pressed, anything else is whatever the driver sent.
    Key { code: u32, state: u32 },
    /// One accelerometer sample.
    Accel { x: i32, y: i32, z: i32 },
    /// The device link changed and its interfaces should be reopened.
    Watch,
    /// Anything else; carries the raw event type for logging.
    Other(u16),
}
