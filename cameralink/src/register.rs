/*!
Double-buffered clocked state.

Every clocked component keeps its registers in a [`Register`]: the
`current` value is what the rest of the system sees during a cycle, writes
go to `next`, and [`Clocked::commit`] publishes them at the cycle boundary.
A cycle therefore never observes its own partial updates.
*/

/// A register holding the value for this cycle and the one staged for the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Register<T: Copy> {
    current: T,
    next: T,
}

impl<T: Copy> Register<T> {
    pub fn new(value: T) -> Self {
        Self { current: value, next: value }
    }

    /// Value visible during this cycle
    pub fn get(&self) -> T {
        self.current
    }

    /// Value staged for the next cycle
    pub fn staged(&self) -> T {
        self.next
    }

    /// Stage the value for the next cycle
    pub fn set(&mut self, value: T) {
        self.next = value;
    }

    /// Publish the staged value.
    ///
    /// `next` keeps the committed value, so a register that is not written
    /// during a cycle holds its value.
    pub fn commit(&mut self) {
        self.current = self.next;
    }

    /// Force both halves to `value`
    pub fn reset(&mut self, value: T) {
        self.current = value;
        self.next = value;
    }
}

/// A component advanced by a clock edge
pub trait Clocked {
    /// Publish every value staged during this cycle
    fn commit(&mut self);
}

impl<T: Copy> Clocked for Register<T> {
    fn commit(&mut self) {
        Register::commit(self);
    }
}
