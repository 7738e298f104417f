//! Picks one bounded multi-producer multi-consumer channel implementation to back
//! [`crate::pool::ThreadPool`]'s job queue, selected by feature flag so the rest of the
//! crate never has to know which crate is underneath.

#[cfg(feature = "crossbeam")]
mod imp {
    pub use crossbeam_channel::{bounded, Receiver, Sender};
}

#[cfg(all(feature = "flume", not(feature = "crossbeam")))]
mod imp {
    pub use flume::{bounded, Receiver, Sender};
}

#[cfg(all(feature = "loole", not(feature = "crossbeam"), not(feature = "flume")))]
mod imp {
    pub use loole::{bounded, Receiver, Sender};
}

#[cfg(not(any(feature = "crossbeam", feature = "flume", feature = "loole")))]
compile_error!("apiary requires one of the `crossbeam`, `flume`, or `loole` features");

pub use imp::{bounded, Receiver, Sender};
