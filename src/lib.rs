// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # dotinline
//!
//! Class inlining for a managed, object-oriented SSA intermediate
//! representation.
//!
//! `dotinline` proves that an object never needs to exist as a real heap
//! object inside the method that uses it, and rewrites the method so the
//! object's fields become local SSA values and every call made on it is
//! inlined away. This is scalar replacement of aggregates, driven by a
//! use-walk over aliases, a size budget checked before anything changes,
//! and a multi-step commit that rolls back when it hits a use it did not
//! expect.
//!
//! ## Features
//!
//! - **Allocations and singletons** - `new C(..)` in the method, and reads of
//!   static final fields holding a constructed instance with constant state
//! - **Constructor chains** - inlined down to the root constructor
//! - **Field value reconstruction** - reads replaced by the reaching store,
//!   with phis at control flow joins
//! - **Rollback** - a failed commit restores the method exactly
//! - **Parallel pipeline** - methods are processed concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::prelude::*;
//!
//! let mut program = Program::new();
//! let point = program.add_class("Point", ClassFlags::empty(), None);
//! let x = program.add_field(point, "x", FieldFlags::empty(), ValueType::Int)?;
//! let ctor = program.add_method(point, ".ctor", MethodFlags::CONSTRUCTOR, 1)?;
//! let object_ctor = program.root_constructor();
//! program.set_body(ctor, SsaFunctionBuilder::new(2).build_with(|f| {
//!     let (this, v) = (f.arg(0), f.arg(1));
//!     f.block(0, |b| {
//!         b.call_void(CallKind::Direct, object_ctor, &[this]);
//!         b.store_field(this, x, v);
//!         b.ret();
//!     });
//! }))?;
//!
//! let main = program.add_class("Main", ClassFlags::empty(), None);
//! let run = program.add_method(main, "run", MethodFlags::STATIC, 1)?;
//! program.set_body(run, SsaFunctionBuilder::new(1).build_with(|f| {
//!     let a = f.arg(0);
//!     f.block(0, |b| {
//!         let p = b.new_object(point, ctor, &[a]);
//!         let v = b.load_field(p, x);
//!         b.ret_val(v);
//!     });
//! }))?;
//!
//! let program = Arc::new(program);
//! let result = Compiler::default().compile(&program)?;
//! assert_eq!(result.stats().classes_inlined, 1);
//! # Ok::<(), dotinline::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Tokens and the program model: classes, fields, methods,
//!   hierarchy queries, dispatch resolution and access checks
//! - [`analysis`] - The SSA IR: functions, blocks, instructions, phis, the
//!   control flow graph and dominators, and a closure-based builder
//! - [`compiler`] - Method summaries, the shared context, the pass scheduler
//!   and the passes themselves, with class inlining in
//!   [`compiler::passes::classinliner`]
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`]. Class-inlining rejections and
//! aborted commits are not errors: they are typed outcomes recorded in the
//! [`compiler::EventLog`] and logged through the `log` facade.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use dotinline::prelude::*;
///
/// let program = Program::new();
/// assert!(program.class(program.object_class()).is_some());
/// ```
pub mod prelude;

/// The SSA intermediate representation.
pub mod analysis;

/// Summaries, scheduling and the optimization passes.
pub mod compiler;

/// Tokens and the program model.
pub mod metadata;

/// `dotinline` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotinline` Error type
///
/// See [`error::Error`] for the variants.
pub use error::Error;
