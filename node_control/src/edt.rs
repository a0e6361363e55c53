use heapless::Vec;
use no_std_compat::cell::{Cell, RefCell};
use no_std_compat::cmp::Ordering::Equal;

/// Maximum number of pending messages.
pub const QUEUE_CAPACITY: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq, Copy)]
pub struct Msg<T: Sized> {
    pub when: u64,
    pub order: u32,
    pub payload: T,
}

/// Event dispatch queue: delayed messages handled one by one on a single thread.
///
/// Time is in milliseconds since creation, kept in 64 bits so it does not wrap during the
/// life of a node. It only moves forward when [EDT::poll] hands out a wait or
/// [EDT::advance_time_by] is used.
pub struct EDT<T> {
    now: Cell<u64>,
    queue: RefCell<Vec<Msg<T>, QUEUE_CAPACITY>>,
}

pub enum Event<T> {
    Execute { msg: T },
    Wait { ms: u32 },
    Halt,
}

impl<T: Copy> EDT<T> {
    pub fn create() -> EDT<T> {
        EDT {
            now: Cell::new(0),
            queue: RefCell::new(Vec::new()),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Hands out the next due message, or how long to sleep until it is due.
    pub fn poll(&self) -> Event<T> {
        match self.peek_head() {
            Some(head) => {
                let to_wait = head.when.saturating_sub(self.now.get());
                if to_wait > 0 {
                    self.now.set(head.when);
                    // a message is never scheduled further than u32::MAX ms ahead
                    Event::Wait {
                        ms: u32::try_from(to_wait).unwrap_or(u32::MAX),
                    }
                } else {
                    self.take(&head);
                    Event::Execute { msg: head.payload }
                }
            }
            None => Event::Halt,
        }
    }

    /// Advances the time by the given value and feeds due messages to the handler
    pub fn advance_time_by(&self, time: u32, handler: &dyn Fn(T)) {
        let target = self.now.get() + u64::from(time);
        loop {
            match self.peek_head() {
                Some(head) if head.when <= target => {
                    if head.when > self.now.get() {
                        self.now.set(head.when);
                    }
                    self.take(&head);
                    handler(head.payload);
                }
                _ => {
                    self.now.set(target);
                    break;
                }
            }
        }
    }

    /// Queues `payload` to be handled in `delay` ms. Messages due at the same time keep
    /// their scheduling order. Gives the payload back if the queue is full.
    pub fn schedule(&self, delay: u32, payload: T) -> Result<(), T> {
        let when = self.now.get() + u64::from(delay);

        let order = self
            .queue
            .borrow()
            .iter()
            .filter(|message| message.when == when)
            .map(|it| it.order + 1)
            .max()
            .unwrap_or(0);

        self.queue
            .borrow_mut()
            .push(Msg {
                when,
                order,
                payload,
            })
            .map_err(|msg| msg.payload)
    }

    pub fn remove<F>(&self, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.queue.borrow_mut().retain(|it| !predicate(&it.payload));
    }

    /// Stops the loop driving [EDT::poll] once the current message is handled.
    pub fn exit(&self) {
        self.queue.borrow_mut().clear();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    fn peek_head(&self) -> Option<Msg<T>> {
        self.queue
            .borrow()
            .iter()
            .min_by(|lhs, rhs| {
                let by_when = lhs.when.cmp(&rhs.when);
                match by_when {
                    Equal => lhs.order.cmp(&rhs.order),
                    _ => by_when,
                }
            })
            .cloned()
    }

    fn take(&self, head: &Msg<T>) {
        let mut queue = self.queue.borrow_mut();
        if let Some(position) = queue
            .iter()
            .position(|it| it.when == head.when && it.order == head.order)
        {
            queue.swap_remove(position);
        }
    }
}
