/// Port types for module interconnection
///
/// A channel is a bounded FIFO with ready/valid semantics: the producer
/// holds an `OutPort` and may push while the FIFO has room (ready), the
/// consumer holds an `InPort` and may pop while it holds data (valid).
/// All operations are non-blocking; blocking behaviour is built on top by
/// the modules themselves (stall and retry on the next cycle).
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

struct Fifo<T> {
  name: String,
  depth: usize,
  queue: VecDeque<T>,
}

trait Occupancy {
  fn occupancy(&self) -> usize;
  fn label(&self) -> &str;
}

impl<T> Occupancy for Fifo<T> {
  fn occupancy(&self) -> usize {
    self.queue.len()
  }

  fn label(&self) -> &str {
    &self.name
  }
}

/// Payload-agnostic view of a channel's fill level.
#[derive(Clone)]
pub struct Probe {
  fifo: Rc<RefCell<dyn Occupancy>>,
}

impl Probe {
  pub fn len(&self) -> usize {
    self.fifo.borrow().occupancy()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn name(&self) -> String {
    self.fifo.borrow().label().to_string()
  }
}

/// Create a connected port pair. `depth` is clamped to at least 1.
pub fn channel<T>(name: impl Into<String>, depth: usize) -> (OutPort<T>, InPort<T>) {
  let depth = depth.max(1);
  let fifo = Rc::new(RefCell::new(Fifo {
    name: name.into(),
    depth,
    queue: VecDeque::with_capacity(depth),
  }));
  (OutPort { fifo: Rc::clone(&fifo) }, InPort { fifo })
}

/// Producer side of a channel
pub struct OutPort<T> {
  fifo: Rc<RefCell<Fifo<T>>>,
}

impl<T> OutPort<T> {
  /// Receiver is ready to accept one more value.
  pub fn can_push(&self) -> bool {
    let fifo = self.fifo.borrow();
    fifo.queue.len() < fifo.depth
  }

  /// Push without blocking. Hands the value back when the channel is full.
  pub fn push_nb(&self, value: T) -> Result<(), T> {
    let mut fifo = self.fifo.borrow_mut();
    if fifo.queue.len() < fifo.depth {
      fifo.queue.push_back(value);
      Ok(())
    } else {
      Err(value)
    }
  }

  pub fn name(&self) -> String {
    self.fifo.borrow().name.clone()
  }
}

impl<T: 'static> OutPort<T> {
  pub fn probe(&self) -> Probe {
    Probe { fifo: self.fifo.clone() }
  }
}

/// Consumer side of a channel
pub struct InPort<T> {
  fifo: Rc<RefCell<Fifo<T>>>,
}

impl<T> InPort<T> {
  /// A value is waiting.
  pub fn is_valid(&self) -> bool {
    !self.fifo.borrow().queue.is_empty()
  }

  /// Pop without blocking.
  pub fn pop_nb(&self) -> Option<T> {
    self.fifo.borrow_mut().queue.pop_front()
  }

  pub fn len(&self) -> usize {
    self.fifo.borrow().queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop everything in flight (reset).
  pub fn clear(&self) {
    self.fifo.borrow_mut().queue.clear();
  }

  pub fn name(&self) -> String {
    self.fifo.borrow().name.clone()
  }
}

impl<T: 'static> InPort<T> {
  pub fn probe(&self) -> Probe {
    Probe { fifo: self.fifo.clone() }
  }
}

impl<T: Clone> InPort<T> {
  pub fn peek(&self) -> Option<T> {
    self.fifo.borrow().queue.front().cloned()
  }
}
