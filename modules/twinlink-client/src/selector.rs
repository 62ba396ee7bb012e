//! Predicates deciding which registrations an inbound notification reaches.

use twinlink_signals::{Change, JsonPointer, LiveMessage, ThingId};

pub trait Selects<T>: Send + Sync {
    fn selects(&self, item: &T) -> bool;
}

/// Change selector: optionally one thing, optionally one subtree of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    thing: Option<ThingId>,
    path: JsonPointer,
}

impl Selector {
    /// Every change of every thing.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn thing(thing_id: ThingId) -> Self {
        Self {
            thing: Some(thing_id),
            path: JsonPointer::root(),
        }
    }

    /// Narrow to changes overlapping `path`. A change to an ancestor (a
    /// whole-thing delete, say) overlaps every path below it.
    pub fn under(mut self, path: JsonPointer) -> Self {
        self.path = path;
        self
    }

    pub fn thing_id(&self) -> Option<&ThingId> {
        self.thing.as_ref()
    }

    pub fn path(&self) -> &JsonPointer {
        &self.path
    }
}

impl Selects<Change> for Selector {
    fn selects(&self, change: &Change) -> bool {
        let thing_ok = self
            .thing
            .as_ref()
            .map_or(true, |id| *id == change.thing_id);
        thing_ok && self.path.overlaps(&change.path)
    }
}

/// Live message filter on thing and application subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    thing: Option<ThingId>,
    subject: Option<String>,
}

impl MessageFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn thing(thing_id: ThingId) -> Self {
        Self {
            thing: Some(thing_id),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl Selects<LiveMessage> for MessageFilter {
    fn selects(&self, message: &LiveMessage) -> bool {
        let thing_ok = self
            .thing
            .as_ref()
            .map_or(true, |id| *id == message.thing_id);
        let subject_ok = self
            .subject
            .as_deref()
            .map_or(true, |s| s == message.subject);
        thing_ok && subject_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinlink_signals::{ChangeAction, Channel, Headers, MessageDirection};

    fn change(thing: &str, path: &str) -> Change {
        Change {
            channel: Channel::Twin,
            thing_id: ThingId::parse(thing).unwrap(),
            action: ChangeAction::Updated,
            path: JsonPointer::parse(path).unwrap(),
            value: None,
            revision: 1,
            timestamp: None,
            headers: Headers::new(),
        }
    }

    #[test]
    fn all_selects_everything() {
        assert!(Selector::all().selects(&change("ns:a", "/attributes/x")));
        assert!(Selector::all().selects(&change("ns:b", "/")));
    }

    #[test]
    fn thing_selector_filters_by_id() {
        let sel = Selector::thing(ThingId::parse("ns:a").unwrap());
        assert!(sel.selects(&change("ns:a", "/features")));
        assert!(!sel.selects(&change("ns:b", "/features")));
    }

    #[test]
    fn path_selector_accepts_ancestors_and_descendants() {
        let sel = Selector::all().under(JsonPointer::parse("/attributes").unwrap());
        assert!(sel.selects(&change("ns:a", "/attributes/location/lat")));
        assert!(sel.selects(&change("ns:a", "/")));
        assert!(!sel.selects(&change("ns:a", "/features/lamp")));
    }

    #[test]
    fn message_filter_on_subject() {
        let msg = LiveMessage {
            thing_id: ThingId::parse("ns:a").unwrap(),
            subject: "alarm".into(),
            direction: MessageDirection::From,
            feature_id: None,
            payload: None,
            correlation_id: None,
            headers: Headers::new(),
        };
        assert!(MessageFilter::all().selects(&msg));
        assert!(MessageFilter::all().with_subject("alarm").selects(&msg));
        assert!(!MessageFilter::all().with_subject("reboot").selects(&msg));
        assert!(!MessageFilter::thing(ThingId::parse("ns:b").unwrap()).selects(&msg));
    }
}
