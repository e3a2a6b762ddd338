// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step records as handed over by the document parser.

use crate::{data_table::DataTable, parameter::StepArgumentKind};

/// Multi-line free-text block attached to a step.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DocString {
    /// Text between the delimiters.
    pub content: String,

    /// Delimiter the block was written with (`"""` or ```` ``` ````).
    pub delimiter: Option<String>,

    /// Media type following the opening delimiter, like `yaml`.
    pub media_type: Option<String>,
}

impl DocString {
    /// Creates a new [`DocString`] with the given `content` only.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), delimiter: None, media_type: None }
    }

    /// Sets the media type of this [`DocString`].
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Optional trailing argument of a step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepArgument {
    /// Attached [`DocString`].
    DocString(DocString),

    /// Attached [`DataTable`].
    DataTable(DataTable),
}

impl StepArgument {
    /// Returns the [`StepArgumentKind`] of this argument.
    #[must_use]
    pub const fn kind(&self) -> StepArgumentKind {
        match self {
            Self::DocString(_) => StepArgumentKind::DocString,
            Self::DataTable(_) => StepArgumentKind::DataTable,
        }
    }
}

/// Single step to be resolved and executed.
///
/// Its text is expected to be variable-substituted already.
#[derive(Clone, Debug, PartialEq)]
pub struct StepInput {
    /// Keyword the step was written with (`Given`, `When`, `And`...).
    pub keyword: String,

    /// Step text without the keyword.
    pub text: String,

    /// Attached doc-string or data-table.
    pub argument: Option<StepArgument>,
}

impl StepInput {
    /// Creates a new [`StepInput`] without a keyword and argument.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { keyword: String::new(), text: text.into(), argument: None }
    }

    /// Sets the keyword of this [`StepInput`].
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    /// Attaches a [`DocString`] to this [`StepInput`].
    #[must_use]
    pub fn with_doc_string(mut self, doc: DocString) -> Self {
        self.argument = Some(StepArgument::DocString(doc));
        self
    }

    /// Attaches a [`DataTable`] to this [`StepInput`].
    #[must_use]
    pub fn with_table(mut self, table: impl Into<DataTable>) -> Self {
        self.argument = Some(StepArgument::DataTable(table.into()));
        self
    }
}

impl From<&gherkin::Step> for StepInput {
    fn from(step: &gherkin::Step) -> Self {
        let argument = step
            .docstring
            .as_ref()
            .map(|d| StepArgument::DocString(DocString::new(d.clone())))
            .or_else(|| {
                step.table
                    .as_ref()
                    .map(|t| StepArgument::DataTable(DataTable::from(t)))
            });
        Self {
            keyword: step.keyword.trim().to_owned(),
            text: step.value.clone(),
            argument,
        }
    }
}
