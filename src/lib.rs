//! # Abacus
//!
//! Turns a plain-language analysis task plus a pile of data files into a
//! structured answer — numbers, text, embedded charts — inside a fixed
//! wall-clock budget.
//!
//! One request flows through five stages:
//!
//! ```text
//! uploaded parts
//!     ↓
//! Input Normalizer   → Workspace of named, typed artifacts
//!     ↓
//! Task Planner       → Plan (steps + response shape), via the Oracle
//!     ↓
//! Step Executor      → execution records, supervised by the Deadline
//!     ↓
//! Result Assembler   → Response (always shape-complete, maybe partial)
//! ```
//!
//! The planner's reasoning collaborator, the data fetcher, and the chart
//! renderer are all traits; swap in mocks and the whole pipeline runs
//! hermetically in tests.

pub mod assemble;
pub mod consts;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod image;
pub mod normalize;
pub mod oracle;
pub mod plan;
pub mod planner;
pub mod table;
pub mod workspace;
