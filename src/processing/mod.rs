//! Background pipeline execution

pub mod executor;
pub mod worker;

pub use executor::PipelineExecutor;
pub use worker::PipelineWorker;
