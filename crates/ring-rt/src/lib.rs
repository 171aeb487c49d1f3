//! # ring-rt — default (safe) implementations of every `ring-core` trait
//!
//! Each impl prioritizes correctness and simplicity over peak throughput.
//! Swapping one out means changing a type alias at the call site — no
//! trait in `ring-core` is implemented more than once here, but nothing
//! stops an embedder from writing their own and using it instead.
//!
//! | Trait              | Default impl          |
//! |---------------------|-----------------------|
//! | `ResourceTable<T>`  | `ResourceTable`        |
//! | `WorkerPool`        | `FixedPool`            |
//! | `ReadinessPoller`   | `UringPoller`          |
//! | `Notifier`          | `EventFdNotifier`      |
//! | `CompletionSink`    | `CompletionPath`       |

pub mod cancel;
pub mod completion;
pub mod link;
pub mod notifier;
pub mod poller;
pub mod request_pool;
pub mod resource_table;
pub mod rings;
pub mod timeout;
pub mod worker;
