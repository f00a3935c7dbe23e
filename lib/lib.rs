//! This library crate reconstructs a native-library build model from the
//! files a `ninja`-based C/C++ build leaves behind.
//!
//! # File formats
//!
//! This crate implements support for several file formats:
//!
//! - **`build.ninja` files**
//!
//!   The [`ninja`] module contains everything you need to tokenize and
//!   parse `build.ninja` files, including the `$`-escape rules, the
//!   statement grammar, and variable expansion. Malformed input is
//!   reported through a caller-supplied [diagnostics sink][diagnostics]
//!   and never aborts a parse.
//!
//! - **`.ninja_deps` files**
//!
//!   The [`deplog`] module can read and write `.ninja_deps` files, which
//!   hold the header dependencies discovered during previous builds, and
//!   answers "what does target T depend on" queries over them.
//!
//! - **Compile-command summaries**
//!
//!   The [`cmdlog`] module reads and writes the binary per-source
//!   compile-command summary produced while adapting a build file.
//!
//! # The graph adapter
//!
//! The [`adapt`] module ties the parsing layers together: it walks one
//! `build.ninja` (following `include` and `subninja`), resolves target
//! names through phony aliases and passthrough edges, classifies runtime
//! dependencies, and produces the library map and compile-command stream
//! consumed by IDE tooling and incremental-build logic.

pub mod adapt;
pub mod cmdlog;
pub mod deplog;
pub mod diagnostics;
pub mod ninja;
