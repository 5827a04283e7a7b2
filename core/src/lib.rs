//! Physical network management for physnet.
//!
//! This crate owns the state-transition logic of a single routing domain: interface
//! membership, the shared permission, default-network fallthrough and UID-range routing. The
//! kernel-facing work is delegated to the collaborator traits in [`route`], [`sock_diag`] and
//! [`delegate`]; [`recording`] provides an implementation of all three that journals instead
//! of programming the kernel.

pub mod delegate;
pub mod error;
mod network;
pub mod recording;
pub mod route;
pub mod sock_diag;

pub use delegate::FallthroughDelegate;
pub use error::{Errno, InvalidArgument, NetworkError, Operation, Result};
pub use network::{KernelHandles, PhysicalNetwork};
pub use recording::{Call, CallKind, Fault, RecordingKernel};
pub use route::{ResolvableInterface, RouteController, RouteSpec, RouteTable, RouteType};
pub use sock_diag::{SockDiag, SockDiagSession};
