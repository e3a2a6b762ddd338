// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors of resolving step text.

use derive_more::with_trait::{Display, Error};

/// Error of resolving step text against a [`Collection`].
///
/// [`Collection`]: super::Collection
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum ResolveError {
    /// No registered definition matches the whole text.
    #[display("no step definition matches `{text}`")]
    NoMatch {
        /// Text of the unmatched step.
        #[error(not(source))]
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_text() {
        let err = ResolveError::NoMatch { text: "a pod named web".into() };
        assert_eq!(err.to_string(), "no step definition matches `a pod named web`");
    }
}
