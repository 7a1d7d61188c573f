mod transfer;
mod wait;

pub use transfer::{
    StepError, StepOutcome, TransferItem, TransferKind, run_transfer, spawn_transfer,
};
pub use wait::{WaitError, wait_for_task_completion, wait_for_task_completion_with_interval};
