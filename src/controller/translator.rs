//! # Event Translator Module
//!
//! Turns Wii Remote key and accelerometer events into gamepad reports.
//!
//! Each translator owns a fixed table of report templates built once from a
//! [`GamepadLayout`]: one per Wii key, one per axis and one synchronization
//! report. Only the `value` of a template changes afterwards; its kind and
//! code are fixed for the lifetime of the device.
//!
//! ## Template Table
//!
//! | Index | Report |
//! |-------|--------|
//! | 0-10 | EV_KEY, code from the layout (indexed by Wii key) |
//! | 11 | EV_ABS, first axis |
//! | 12 | EV_ABS, second axis |
//! | 13 | EV_SYN, SYN_REPORT |
//!
//! ## Accelerometer Mapping
//!
//! - first axis = -y (vertical sensor axis, inverted)
//! - second axis = x, or -x when `invert_horizontal` is set
//!
//! Both are clipped into the declared range before being written.

use evdev::{EventType, InputEvent};
use std::io;
use tracing::{trace, warn};

use crate::controller::events::WII_KEY_COUNT;
use crate::uinput::layout::{AxisSpec, GamepadLayout};
use crate::uinput::sink_trait::ReportSink;

/// Template index of the first axis.
pub const AXIS_FIRST: usize = WII_KEY_COUNT;
/// Template index of the second axis.
pub const AXIS_SECOND: usize = WII_KEY_COUNT + 1;
/// Template index of the synchronization report.
pub const SYNC: usize = WII_KEY_COUNT + 2;
/// Size of the template table.
pub const TEMPLATE_COUNT: usize = WII_KEY_COUNT + 3;

/// One pre-built report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportTemplate {
    kind: EventType,
    code: u16,
    /// Last value written for this report.
    pub value: i32,
}

impl ReportTemplate {
    const fn new(kind: EventType, code: u16) -> Self {
        Self { kind, code, value: 0 }
    }

    /// Event kind (fixed).
    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// Event code (fixed).
    pub fn code(&self) -> u16 {
        self.code
    }

    fn event(&self) -> InputEvent {
        InputEvent::new(self.kind, self.code, self.value)
    }
}

/// What happened to one translated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Reports were written.
    Written,
    /// The event was out of range and dropped without touching any template.
    Discarded,
    /// The templates were updated but there was no virtual device to write to.
    Omitted,
}

/// Per-device translation state.
#[derive(Debug, Clone)]
pub struct Translator {
    templates: [ReportTemplate; TEMPLATE_COUNT],
    axes: [AxisSpec; 2],
    invert_horizontal: bool,
}

impl Translator {
    /// Builds the template table for a layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use wiimote_pad::config::GamepadConfig;
    /// use wiimote_pad::controller::translator::{Translator, SYNC};
    /// use wiimote_pad::uinput::layout::{GamepadLayout, Orientation};
    ///
    /// let layout = GamepadLayout::new(&GamepadConfig::default(), Orientation::Portrait);
    /// let translator = Translator::new(&layout);
    /// assert_eq!(translator.template(SYNC).code(), 0);
    /// ```
    #[must_use]
    pub fn new(layout: &GamepadLayout) -> Self {
        let mut templates = [ReportTemplate::new(EventType::SYNCHRONIZATION, 0); TEMPLATE_COUNT];
        for (slot, key) in templates.iter_mut().zip(layout.buttons.iter()) {
            *slot = ReportTemplate::new(EventType::KEY, key.code());
        }
        templates[AXIS_FIRST] = ReportTemplate::new(EventType::ABSOLUTE, layout.axes[0].axis.0);
        templates[AXIS_SECOND] = ReportTemplate::new(EventType::ABSOLUTE, layout.axes[1].axis.0);

        Self {
            templates,
            axes: layout.axes,
            invert_horizontal: layout.invert_horizontal,
        }
    }

    /// Read access to one template.
    ///
    /// # Panics
    ///
    /// Panics if `index >= TEMPLATE_COUNT`.
    #[must_use]
    pub fn template(&self, index: usize) -> &ReportTemplate {
        &self.templates[index]
    }

    /// Translates a key event.
    ///
    /// Codes outside the Wii key range and states other than 0/1 are
    /// discarded. Otherwise the key report is written, then a sync report.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if a write fails.
    pub fn on_key<K: ReportSink>(
        &mut self,
        sink: Option<&mut K>,
        code: u32,
        state: u32,
    ) -> io::Result<Translation> {
        let index = code as usize;
        if index >= WII_KEY_COUNT || state > 1 {
            trace!("Discarding key event code={} state={}", code, state);
            return Ok(Translation::Discarded);
        }
        self.templates[index].value = state as i32;

        let Some(sink) = sink else {
            warn!("Nowhere to report button presses to");
            return Ok(Translation::Omitted);
        };
        sink.write_report(&self.templates[index].event())?;
        sink.write_report(&self.templates[SYNC].event())?;
        Ok(Translation::Written)
    }

    /// Translates an accelerometer sample.
    ///
    /// Writes the first axis, the second axis, then a sync report.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if a write fails.
    pub fn on_accel<K: ReportSink>(
        &mut self,
        sink: Option<&mut K>,
        x: i32,
        y: i32,
    ) -> io::Result<Translation> {
        let (first, second) = self.accel_axes(x, y);
        self.templates[AXIS_FIRST].value = first;
        self.templates[AXIS_SECOND].value = second;

        let Some(sink) = sink else {
            warn!("Nowhere to report accel to");
            return Ok(Translation::Omitted);
        };
        sink.write_report(&self.templates[AXIS_FIRST].event())?;
        sink.write_report(&self.templates[AXIS_SECOND].event())?;
        sink.write_report(&self.templates[SYNC].event())?;
        Ok(Translation::Written)
    }

    /// Clipped axis values for a sensor reading.
    #[must_use]
    pub fn accel_axes(&self, x: i32, y: i32) -> (i32, i32) {
        let horizontal = if self.invert_horizontal {
            x.saturating_neg()
        } else {
            x
        };
        (
            self.axes[0].clamp(y.saturating_neg()),
            self.axes[1].clamp(horizontal),
        )
    }
}
