//! Engine interrupt handlers, one slot per logical interrupt source.
//!
//! The mainline writes slots at any time; interrupt dispatch reads them
//! asynchronously. There is no lock: interrupt context cannot wait for the
//! mainline. Instead every update follows a fixed order:
//!
//! 1. clear the callback,
//! 2. write the new context,
//! 3. write the new callback.
//!
//! A dispatch that runs between any two steps either sees no callback and
//! skips the slot, or sees a callback published after its context. On the
//! single-CPU target an interrupt runs to completion before the mainline
//! resumes, so this makes every update appear atomic to dispatch. A reader
//! that can truly run in parallel (another CPU, or a loom thread) may still
//! load a callback, lose the race to a complete update, and then load the
//! newer context. Two updates of the same slot that overlap (one made from
//! a handler while the mainline is between steps) can likewise leave the
//! first writer's callback on the second writer's context. Both windows are
//! accepted; closing them would mean masking the source's interrupt line
//! around the swap.

use core::fmt;
use core::ptr;

use custodian_core::sync::loom_compat::{AtomicPtr, Ordering};

use crate::regs::{CiaIcr, CiaUnit, IntBits};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Custom-chip interrupt sources, numbered by their INTREQ bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ChipSource {
    Tbe = 0,
    DskBlk = 1,
    Soft = 2,
    Ports = 3,
    Coper = 4,
    Vertb = 5,
    Blit = 6,
    Aud0 = 7,
    Aud1 = 8,
    Aud2 = 9,
    Aud3 = 10,
    Rbf = 11,
    DskSyn = 12,
    Exter = 13,
}

impl ChipSource {
    /// Number of chip sources.
    pub const COUNT: usize = 14;

    /// All sources, in bit order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Tbe,
        Self::DskBlk,
        Self::Soft,
        Self::Ports,
        Self::Coper,
        Self::Vertb,
        Self::Blit,
        Self::Aud0,
        Self::Aud1,
        Self::Aud2,
        Self::Aud3,
        Self::Rbf,
        Self::DskSyn,
        Self::Exter,
    ];

    /// INTREQ bit of this source.
    pub const fn bit(self) -> IntBits {
        IntBits::from_bits_retain(1 << self as u16)
    }
}

/// CIA interrupt sources, numbered by their ICR bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiaSource {
    /// Timer A underflow.
    TimerA = 0,
    /// Timer B underflow.
    TimerB = 1,
    /// Time-of-day alarm.
    Alarm = 2,
    /// Serial port (keyboard on CIA-A).
    Serial = 3,
    /// FLAG pin.
    Flag = 4,
}

impl CiaSource {
    /// Number of sources per CIA.
    pub const COUNT: usize = 5;

    /// All sources, in bit order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::TimerA,
        Self::TimerB,
        Self::Alarm,
        Self::Serial,
        Self::Flag,
    ];

    /// ICR bit of this source.
    pub const fn bit(self) -> CiaIcr {
        CiaIcr::from_bits_retain(1 << self as u8)
    }
}

/// A logical interrupt source that can carry a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptId {
    /// A custom-chip source with its own INTREQ bit.
    Chip(ChipSource),
    /// A CIA source, multiplexed through `PORTS` (CIA-A) or `EXTER` (CIA-B).
    Cia(CiaUnit, CiaSource),
}

impl InterruptId {
    /// Number of handler slots.
    pub const COUNT: usize = ChipSource::COUNT + 2 * CiaSource::COUNT;

    /// Slot index of this identifier.
    pub const fn slot(self) -> usize {
        match self {
            Self::Chip(src) => src as usize,
            Self::Cia(unit, src) => ChipSource::COUNT + unit.index() * CiaSource::COUNT + src as usize,
        }
    }

    /// Identifier for a slot index.
    pub const fn from_slot(slot: usize) -> Option<Self> {
        if slot < ChipSource::COUNT {
            return Some(Self::Chip(ChipSource::ALL[slot]));
        }
        let cia = slot - ChipSource::COUNT;
        if cia >= 2 * CiaSource::COUNT {
            return None;
        }
        let unit = if cia < CiaSource::COUNT { CiaUnit::A } else { CiaUnit::B };
        Some(Self::Cia(unit, CiaSource::ALL[cia % CiaSource::COUNT]))
    }
}

impl fmt::Display for InterruptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chip(src) => write!(f, "{src:?}"),
            Self::Cia(unit, src) => write!(f, "{unit} {src:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Opaque value handed back to a handler on every call.
///
/// The registry never dereferences it; the registering subsystem decides
/// what it points to and how it is shared with interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Context(*mut ());

// SAFETY: The registry only stores and returns the pointer. Whoever casts
// it back is responsible for the pointee's thread safety.
unsafe impl Send for Context {}
// SAFETY: As above.
unsafe impl Sync for Context {}

impl Context {
    /// No context.
    pub const NULL: Self = Self(ptr::null_mut());

    /// Context pointing at a static value.
    pub fn from_ref<T: Sync>(value: &'static T) -> Self {
        Self(ptr::from_ref(value).cast_mut().cast())
    }

    /// Context from a raw pointer.
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }

    /// Raw pointer.
    pub const fn as_ptr(self) -> *mut () {
        self.0
    }

    /// Whether this is [`NULL`](Self::NULL).
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Callback type. Runs in interrupt context: it must not block, allocate
/// or call back into the arbiter.
pub type HandlerFn = fn(Context);

/// A callback together with its context.
///
/// Registering `Option<Handler>` makes a callback without a context (or the
/// reverse) unrepresentable.
#[derive(Debug, Clone, Copy)]
pub struct Handler {
    func: HandlerFn,
    context: Context,
}

impl Handler {
    /// Pairs `func` with `context`.
    pub const fn new(func: HandlerFn, context: Context) -> Self {
        Self { func, context }
    }

    /// The callback.
    pub const fn func(&self) -> HandlerFn {
        self.func
    }

    /// The context.
    pub const fn context(&self) -> Context {
        self.context
    }

    /// Calls the callback with its context.
    #[inline]
    pub fn call(&self) {
        (self.func)(self.context);
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

struct HandlerSlot {
    func: AtomicPtr<()>,
    context: AtomicPtr<()>,
}

impl HandlerSlot {
    #[cfg(not(loom))]
    const fn new() -> Self {
        Self {
            func: AtomicPtr::new(ptr::null_mut()),
            context: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[cfg(loom)]
    fn new() -> Self {
        Self {
            func: AtomicPtr::new(ptr::null_mut()),
            context: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Steps 1 and 2: hide the callback, then publish the context.
    fn stage(&self, context: Context) {
        self.func.store(ptr::null_mut(), Ordering::Relaxed);
        // Release keeps the clear above ordered before the new context.
        self.context.store(context.as_ptr(), Ordering::Release);
    }

    /// Step 3: publish the callback, or leave it cleared.
    fn commit(&self, func: Option<HandlerFn>) {
        let raw = func.map_or(ptr::null_mut(), |f| f as *mut ());
        self.func.store(raw, Ordering::Release);
    }

    fn load(&self) -> Option<Handler> {
        let raw = self.func.load(Ordering::Acquire);
        if raw.is_null() {
            return None;
        }
        let context = Context(self.context.load(Ordering::Acquire));
        // SAFETY: Only `HandlerFn` pointers are stored in `func` (see
        // `commit`), and null was excluded above.
        let func = unsafe { core::mem::transmute::<*mut (), HandlerFn>(raw) };
        Some(Handler { func, context })
    }

    #[cfg(test)]
    fn raw(&self) -> (*mut (), *mut ()) {
        (
            self.func.load(Ordering::Relaxed),
            self.context.load(Ordering::Relaxed),
        )
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Handler table shared by mainline registration and interrupt dispatch.
///
/// Usually a `static`, since the interrupt stubs reach it without
/// arguments:
///
/// ```ignore
/// static HANDLERS: HandlerRegistry = HandlerRegistry::new();
/// ```
pub struct HandlerRegistry {
    slots: [HandlerSlot; InterruptId::COUNT],
}

impl HandlerRegistry {
    /// Registry with every slot empty.
    #[cfg(not(loom))]
    pub const fn new() -> Self {
        Self {
            slots: [const { HandlerSlot::new() }; InterruptId::COUNT],
        }
    }

    /// Registry with every slot empty.
    #[cfg(loom)]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| HandlerSlot::new()),
        }
    }

    /// Installs `handler` for `id`, or empties the slot with `None`.
    ///
    /// Safe to call while interrupts are live; see the module docs for the
    /// ordering that makes this work without a lock.
    pub fn set_handler(&self, id: InterruptId, handler: Option<Handler>) {
        let slot = &self.slots[id.slot()];
        slot.stage(handler.map_or(Context::NULL, |h| h.context));
        slot.commit(handler.map(|h| h.func));
    }

    /// Current handler of `id`.
    #[inline]
    pub fn handler(&self, id: InterruptId) -> Option<Handler> {
        self.slots[id.slot()].load()
    }

    /// Whether `id` has a handler.
    pub fn is_registered(&self, id: InterruptId) -> bool {
        self.handler(id).is_some()
    }

    /// Calls the handler of `id` if there is one. Returns whether it ran.
    #[inline]
    pub fn invoke(&self, id: InterruptId) -> bool {
        match self.handler(id) {
            Some(handler) => {
                handler.call();
                true
            }
            None => false,
        }
    }

    /// Every registered `(id, handler)` pair, in slot order.
    pub fn registered(&self) -> impl Iterator<Item = (InterruptId, Handler)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let handler = slot.load()?;
            Some((InterruptId::from_slot(i)?, handler))
        })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
