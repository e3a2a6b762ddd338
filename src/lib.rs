// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution engine of a behavior-driven test runner for cluster
//! orchestration APIs.
//!
//! Steps written in plain language, like
//! ``Then pod/web should eventually have jsonpath `.status.phase` equal Running``,
//! are resolved against registered [`StepDefinition`]s, their captures bound
//! to typed handler arguments, and their handlers executed under a
//! cancellable [`StepContext`], yielding a classified [`StepResult`].
//!
//! The building blocks:
//! - [`parameter`]: named `{placeholder}`s with regex fragments and parsers;
//! - [`matcher`]: composable predicates over resource states, themselves
//!   written in step text;
//! - [`step`]: step definitions, resolved first-match-wins;
//! - [`binder`]: conversion of captures, doc strings and data tables into
//!   [`Value`]s;
//! - [`executor`]: the panic boundary classifying how a step ended;
//! - [`assertion`]: eventually/consistently assertions over watch streams of
//!   a [`ResourceClient`].

#![deny(nonstandard_style, trivial_casts, trivial_numeric_casts)]
#![forbid(non_ascii_idents, unsafe_code)]
#![warn(
    clippy::allow_attributes_without_reason,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    clippy::todo,
    clippy::unwrap_used,
    missing_debug_implementations,
    missing_docs,
    rustdoc::all,
    unreachable_pub,
    unused_results
)]

pub mod assertion;
pub mod binder;
pub mod cli;
pub mod client;
pub mod data_table;
pub mod engine;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod parameter;
pub mod pattern;
pub mod resource;
pub mod scheme;
pub mod step;
pub mod value;

pub use gherkin;

#[doc(inline)]
pub use self::{
    assertion::{AssertionMode, AsyncAssertion},
    cli::Cli,
    client::ResourceClient,
    data_table::DataTable,
    engine::Engine,
    error::{Error, Result},
    executor::{Executor, Outcome, StepResult},
    matcher::{Match, MatcherDefinition, Predicate},
    parameter::Parameter,
    resource::ResourceRef,
    scheme::{Scheme, SchemeBuilder},
    step::{DocString, StepContext, StepDefinition, StepHelper, StepInput},
    value::{ArgType, FromArg, Value},
};
