#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewindEvent {
    Started,
    Stopped,
    /// 0.0 at the newest recorded state, 1.0 at the oldest.
    Progress(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&RewindEvent)>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: RewindEvent) {
        for (_, listener) in &mut self.entries {
            listener(&event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
