//! Structured plan descriptions.
//!
//! Every operator describes itself as an [`Explain`] node: a name, labelled
//! attributes and the descriptions of its inputs. `Display` renders the tree
//! with two spaces of indentation per level:
//!
//! ```text
//! Aggregation(GROUP BY 1 field, then: [SUM])
//!   input_type: (integer, integer)
//!   output_type: (integer, bigint)
//!   ValuesScan
//!     row_count: 3
//! ```

use std::fmt;

/// Attribute labels used by operator descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Aggregators,
    GroupingOption,
    InputType,
    OutputType,
    Predicate,
    Projections,
    Table,
    Limit,
    Offset,
    RowCount,
    Assignments,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Aggregators => "aggregators",
            Label::GroupingOption => "grouping_option",
            Label::InputType => "input_type",
            Label::OutputType => "output_type",
            Label::Predicate => "predicate",
            Label::Projections => "projections",
            Label::Table => "table",
            Label::Limit => "limit",
            Label::Offset => "offset",
            Label::RowCount => "row_count",
            Label::Assignments => "assignments",
        }
    }
}

/// Description of one plan node and its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Explain {
    pub name: String,
    pub attributes: Vec<(Label, String)>,
    pub inputs: Vec<Explain>,
}

impl Explain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn attribute(mut self, label: Label, value: impl fmt::Display) -> Self {
        self.attributes.push((label, value.to_string()));
        self
    }

    pub fn input(mut self, input: Explain) -> Self {
        self.inputs.push(input);
        self
    }

    /// First attribute with `label`.
    pub fn get(&self, label: Label) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        writeln!(f, "{}{}", prefix, self.name)?;
        for (label, value) in &self.attributes {
            writeln!(f, "{}  {}: {}", prefix, label.as_str(), value)?;
        }
        for input in &self.inputs {
            input.write_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Renders a list as `[a, b, ...]`.
pub(crate) fn describe_list<T: fmt::Display>(items: &[T]) -> String {
    let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!("[{}]", items.join(", "))
}
