#![forbid(unsafe_code)]

//! Canonical drag events.
//!
//! The host (DOM, windowing toolkit, test script) reduces raw pointer and
//! drag events to [`DragEvent`] tuples before handing them to the layer
//! panel. Only three things matter to the core: what happened
//! ([`DragEventKind`]), which modifier keys were held, and what the gesture
//! carries.
//!
//! # Design Notes
//!
//! - `Modifiers` use bitflags for easy combination
//! - The payload type is generic so the layer crate can carry a typed
//!   collection reference without this crate knowing about layers

use bitflags::bitflags;

bitflags! {
    /// Modifier keys that can be held during a pointer or drag event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
        /// Super/Meta/Command key.
        const SUPER = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// Stage of a drag gesture as seen by a drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragEventKind {
    /// A drag started on a source row.
    Start,
    /// The pointer entered a drop target.
    Enter,
    /// The pointer moved over a drop target.
    Over,
    /// The pointer left the visual boundary of the panel.
    Leave,
    /// The gesture was released over a drop target.
    Drop,
    /// The gesture ended, wherever the pointer was.
    End,
}

impl DragEventKind {
    /// Lowercase name, matching the usual DOM event names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "dragstart",
            Self::Enter => "dragenter",
            Self::Over => "dragover",
            Self::Leave => "dragleave",
            Self::Drop => "drop",
            Self::End => "dragend",
        }
    }
}

/// A payload that did not originate from a strata collection.
///
/// Foreign payloads are identified by their media type; the layer crate
/// only accepts the layer-spec media type and treats everything else as
/// incompatible.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawPayload {
    /// MIME-like type string describing `data`.
    pub media_type: String,
    /// Serialized payload body.
    pub data: String,
}

impl RawPayload {
    /// Create a raw payload.
    #[must_use]
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// A drag event reduced to `{kind, modifiers, payload}`.
///
/// `related_inside` is only meaningful for [`DragEventKind::Leave`]: it is
/// `true` when the pointer left one element of the panel for another element
/// of the same panel, in which case the leave is not a real exit.
#[derive(Debug, Clone, PartialEq)]
pub struct DragEvent<P> {
    /// What happened.
    pub kind: DragEventKind,
    /// Modifier keys held at the time of the event.
    pub modifiers: Modifiers,
    /// Payload carried by the gesture, if the host could read it.
    pub payload: Option<P>,
    /// Whether a leave event moved into a child of the same panel.
    pub related_inside: bool,
}

impl<P> DragEvent<P> {
    /// Create an event without payload or modifiers.
    #[must_use]
    pub const fn new(kind: DragEventKind) -> Self {
        Self {
            kind,
            modifiers: Modifiers::NONE,
            payload: None,
            related_inside: false,
        }
    }

    /// Set the modifier keys.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Mark a leave event as moving into a child of the same panel.
    #[must_use]
    pub fn into_child(mut self) -> Self {
        self.related_inside = true;
        self
    }

    /// Whether the shift key was held.
    #[inline]
    #[must_use]
    pub fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    /// Whether the control key was held.
    #[inline]
    #[must_use]
    pub fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_default_is_none() {
        assert_eq!(Modifiers::default(), Modifiers::NONE);
        assert!(Modifiers::default().is_empty());
    }

    #[test]
    fn modifiers_combine() {
        let m = Modifiers::SHIFT | Modifiers::CTRL;
        assert!(m.contains(Modifiers::SHIFT));
        assert!(m.contains(Modifiers::CTRL));
        assert!(!m.contains(Modifiers::ALT));
    }

    #[test]
    fn event_builders() {
        let ev: DragEvent<u32> = DragEvent::new(DragEventKind::Enter)
            .with_modifiers(Modifiers::SHIFT)
            .with_payload(7);
        assert_eq!(ev.kind, DragEventKind::Enter);
        assert!(ev.shift());
        assert!(!ev.ctrl());
        assert_eq!(ev.payload, Some(7));
        assert!(!ev.related_inside);
    }

    #[test]
    fn leave_into_child() {
        let ev: DragEvent<()> = DragEvent::new(DragEventKind::Leave).into_child();
        assert!(ev.related_inside);
    }

    #[test]
    fn kind_names() {
        assert_eq!(DragEventKind::Enter.as_str(), "dragenter");
        assert_eq!(DragEventKind::End.as_str(), "dragend");
    }
}
