use paste::paste;
use std::fmt::Debug;
use std::sync::atomic::Ordering;

/// Trait for wrappers of `std::sync::atomic` types that provides a common API.
pub trait Atomic<T: Clone + Debug + Default>: Clone + Debug + Default + From<T> + Sync {
    /// Returns the current value of this `Atomic` using `Acquire` ordering.
    fn get(&self) -> T;

    /// Sets the value of this `Atomic` using `Release` ordering and returns the previous value.
    fn set(&self, value: T) -> T;

    /// If the current value of this `Atomic` is `current`, sets it to `new` using `AcqRel`
    /// ordering and returns `true`. Otherwise returns `false` and leaves the value unchanged.
    fn compare_and_set(&self, current: T, new: T) -> bool;
}

macro_rules! atomic {
    ($type:ident) => {
        paste! {
            #[derive(Default)]
            pub struct [<Atomic $type:camel>](std::sync::atomic::[<Atomic $type:camel>]);

            impl Atomic<$type> for [<Atomic $type:camel>] {
                fn get(&self) -> $type {
                    self.0.load(Ordering::Acquire)
                }

                fn set(&self, value: $type) -> $type {
                    self.0.swap(value, Ordering::Release)
                }

                fn compare_and_set(&self, current: $type, new: $type) -> bool {
                    self.0
                        .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                }
            }

            impl Clone for [<Atomic $type:camel>] {
                fn clone(&self) -> Self {
                    Self(self.get().into())
                }
            }

            impl Debug for [<Atomic $type:camel>] {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl From<$type> for [<Atomic $type:camel>] {
                fn from(value: $type) -> Self {
                    [<Atomic $type:camel>](std::sync::atomic::[<Atomic $type:camel>]::new(value))
                }
            }
        }
    };
}

/// Trait for wrappers of `std::sync::atomic` numeric types that provides a common API.
pub trait AtomicNumber<T: Clone + Debug + Default>: Atomic<T> {
    /// Mutably adds `rhs` to the current value of this `Atomic` using `AcqRel` ordering and
    /// returns the previous value.
    fn add(&self, rhs: T) -> T;
}

macro_rules! atomic_number {
    ($type:ident) => {
        paste! {
            atomic!($type);

            impl AtomicNumber<$type> for [<Atomic $type:camel>] {
                fn add(&self, value: $type) -> $type {
                    self.0.fetch_add(value, Ordering::AcqRel)
                }
            }
        }
    };
}

atomic!(bool);
atomic_number!(u64);
atomic_number!(usize);
