//! Observable state container. Mutations go through [`Store::update`], which
//! notifies every listener synchronously on the calling thread.

pub type ListenerId = usize;

type Listener<S> = Box<dyn Fn(&S)>;

pub struct Store<S> {
    state: S,
    listeners: Vec<(ListenerId, Listener<S>)>,
    next_id: ListenerId,
}

impl<S> Store<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn get(&self) -> &S {
        &self.state
    }

    pub fn update<R>(&mut self, mutate: impl FnOnce(&mut S) -> R) -> R {
        let result = mutate(&mut self.state);
        self.notify();
        result
    }

    /// Mutate without notifying listeners.
    pub fn update_silently<R>(&mut self, mutate: impl FnOnce(&mut S) -> R) -> R {
        mutate(&mut self.state)
    }

    pub fn notify(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&S) + 'static) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<S: Default> Default for Store<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_update_notifies_listeners() {
        let mut store = Store::new(0u32);
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        store.subscribe(move |value| seen_clone.set(*value));

        store.update(|value| *value = 7);

        assert_eq!(*store.get(), 7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut store = Store::new(0u32);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = Rc::clone(&calls);
        let id = store.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));

        store.update(|value| *value += 1);
        assert!(store.unsubscribe(id));
        store.update(|value| *value += 1);

        assert_eq!(calls.get(), 1);
        assert_eq!(store.listener_count(), 0);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_silent_update_skips_listeners() {
        let mut store = Store::new(0u32);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = Rc::clone(&calls);
        store.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));

        store.update_silently(|value| *value = 3);

        assert_eq!(*store.get(), 3);
        assert_eq!(calls.get(), 0);
    }
}
