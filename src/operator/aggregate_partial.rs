//! Streaming partial aggregation.
//!
//! The input's first `k` columns are the grouping key and each remaining column
//! feeds one aggregator. Rows are grouped by *contiguous runs* of equal keys:
//! the cursor keeps one group open and emits it as soon as a row with a
//! different key arrives, holding that row as lookahead for the next group.
//!
//! ```text
//! input (k = 1, SUM)        output
//! (1, 5)  ┐
//! (1, 10) ┘ run ────────>   (1, 15)
//! (2, 7)  ─ run ────────>   (2, 7)
//! (1, 1)  ─ run ────────>   (1, 1)     unsorted input: one row per run
//! ```
//!
//! Sorted input therefore yields exactly the full GROUP BY result; unsorted
//! input yields partial results that a later stage can combine. Memory use is
//! one key, one lookahead row and the aggregator states.
//!
//! Rows whose type differs from the declared input type are not aggregated;
//! they are emitted unchanged as soon as they are pulled.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::aggregate::{Aggregator, AggregatorSpec};
use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{Cursor, CursorState};
use crate::error::{QueryError, Result};
use crate::explain::{describe_list, Explain, Label};
use crate::row::{Row, RowHolder, RowType, SharedRow, ValuesRow};
use crate::types::Value;

use super::{InputCursor, Operator};

const TAP_OPEN: &str = "aggregate.open";
const TAP_NEXT: &str = "aggregate.next";

/// Streaming aggregation over contiguous runs of equal grouping keys.
#[derive(Debug)]
pub struct AggregatePartial {
    pub(super) input: Arc<Operator>,
    input_type: RowType,
    row_type: RowType,
    inputs_index: usize,
    aggregators: Vec<AggregatorSpec>,
}

impl AggregatePartial {
    pub(super) fn new(
        input: Arc<Operator>,
        inputs_index: usize,
        aggregators: Vec<AggregatorSpec>,
    ) -> Result<Self> {
        let input_type = input.row_type().clone();
        let columns = input_type.column_count();
        if inputs_index > columns || inputs_index + aggregators.len() != columns {
            return Err(QueryError::configuration(format!(
                "inputs_index(={}) + aggregators(={}) != input row type columns(={})",
                inputs_index,
                aggregators.len(),
                columns
            )));
        }

        let mut output = input_type.columns()[..inputs_index].to_vec();
        for (i, spec) in aggregators.iter().enumerate() {
            spec.instantiate()?;
            output.push(
                spec.factory()
                    .output_type(input_type.column(inputs_index + i))?,
            );
        }
        let row_type = RowType::new(output);
        debug!(
            grouping = inputs_index,
            aggregators = aggregators.len(),
            %row_type,
            "built partial aggregation"
        );
        Ok(Self {
            input,
            input_type,
            row_type,
            inputs_index,
            aggregators,
        })
    }

    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    /// Number of leading grouping columns.
    pub fn inputs_index(&self) -> usize {
        self.inputs_index
    }

    pub fn aggregators(&self) -> &[AggregatorSpec] {
        &self.aggregators
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        let aggregators = self
            .aggregators
            .iter()
            .map(AggregatorSpec::instantiate)
            .collect::<Result<Vec<_>>>()?;
        let input = self.input.cursor(context, bindings)?;
        Ok(Box::new(AggregatePartialCursor {
            base: InputCursor::new(context, input, "AggregatePartial"),
            input_type: self.input_type.clone(),
            row_type: self.row_type.clone(),
            inputs_index: self.inputs_index,
            aggregators,
            key: Vec::with_capacity(self.inputs_index),
            lookahead: RowHolder::new(),
            ever_saw_input: false,
        }))
    }

    pub(super) fn explain(&self) -> Explain {
        Explain::new(self.to_string())
            .attribute(Label::Aggregators, describe_list(&self.aggregators))
            .attribute(Label::GroupingOption, self.inputs_index)
            .attribute(Label::InputType, &self.input_type)
            .attribute(Label::OutputType, &self.row_type)
            .input(self.input.explain())
    }
}

impl fmt::Display for AggregatePartial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.aggregators.iter().map(|a| a.name()).collect();
        match self.inputs_index {
            0 => write!(f, "Aggregation(without GROUP BY: [{}])", names.join(", ")),
            1 => write!(f, "Aggregation(GROUP BY 1 field, then: [{}])", names.join(", ")),
            k => write!(
                f,
                "Aggregation(GROUP BY {} fields, then: [{}])",
                k,
                names.join(", ")
            ),
        }
    }
}

/// Cursor state doubles as the aggregation phase: OPENING means no group is
/// open, RUNNING means `key` holds the open group's key, CLOSING means the
/// final group has been emitted.
struct AggregatePartialCursor {
    base: InputCursor,
    input_type: RowType,
    row_type: RowType,
    inputs_index: usize,
    aggregators: Vec<Box<dyn Aggregator>>,
    key: Vec<Value>,
    lookahead: RowHolder,
    ever_saw_input: bool,
}

impl AggregatePartialCursor {
    fn advance(&mut self) -> Result<Option<SharedRow>> {
        self.base.context.check_cancelled()?;
        if self.base.state == CursorState::Closing {
            self.base.finish()?;
            return Ok(None);
        }
        loop {
            let row = match self.lookahead.take() {
                Some(row) => row,
                None => match self.base.pull()? {
                    Some(row) => row,
                    None => return self.end_of_input(),
                },
            };
            if row.row_type() != &self.input_type {
                trace!(?row, "aggregation passed row through");
                return Ok(Some(row));
            }
            self.ever_saw_input = true;

            if self.base.state == CursorState::Running {
                if self.same_key(&row)? {
                    self.aggregate(row.as_row())?;
                    continue;
                }
                self.lookahead.hold(row);
                let output = self.emit_group()?;
                self.base.state = CursorState::Opening;
                return Ok(Some(output));
            }

            self.start_group(&row)?;
            self.base.state = CursorState::Running;
        }
    }

    fn end_of_input(&mut self) -> Result<Option<SharedRow>> {
        if self.ever_saw_input {
            self.base.state = CursorState::Closing;
            return self.emit_group().map(Some);
        }
        if self.inputs_index == 0 {
            self.base.state = CursorState::Closing;
            let values = self.aggregators.iter().map(|a| a.empty_value()).collect();
            trace!("aggregation emitted empty-input row");
            return Ok(Some(SharedRow::new(ValuesRow::new(
                self.row_type.clone(),
                values,
            ))));
        }
        self.base.finish()?;
        Ok(None)
    }

    fn start_group(&mut self, row: &SharedRow) -> Result<()> {
        self.key.clear();
        for i in 0..self.inputs_index {
            self.key.push(row.value(i)?.clone());
        }
        for aggregator in &mut self.aggregators {
            aggregator.reset();
        }
        self.aggregate(row.as_row())
    }

    fn same_key(&self, row: &SharedRow) -> Result<bool> {
        let registry = self.base.context.registry();
        for (i, current) in self.key.iter().enumerate() {
            let class = self.input_type.column(i).class;
            if !registry.values_equal(current, row.value(i)?, class) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn aggregate(&mut self, row: &dyn Row) -> Result<()> {
        let k = self.inputs_index;
        for (i, aggregator) in self.aggregators.iter_mut().enumerate() {
            aggregator
                .input(row.value(k + i)?)
                .map_err(|e| QueryError::from(e).at_column(k + i))?;
        }
        Ok(())
    }

    fn emit_group(&mut self) -> Result<SharedRow> {
        let k = self.inputs_index;
        let mut values = std::mem::take(&mut self.key);
        values.reserve(self.aggregators.len());
        for (i, aggregator) in self.aggregators.iter_mut().enumerate() {
            let value = aggregator
                .output()
                .map_err(|e| QueryError::from(e).at_column(k + i))?;
            values.push(value);
        }
        let row = SharedRow::new(ValuesRow::new(self.row_type.clone(), values));
        trace!(?row, "aggregation emitted group");
        Ok(row)
    }

    fn abort(&mut self) {
        self.lookahead.release();
        self.key.clear();
        self.base.abort();
    }
}

impl Cursor for AggregatePartialCursor {
    fn open(&mut self) -> Result<()> {
        let _tap = self.base.context.tap(TAP_OPEN);
        self.base.open()?;
        self.key.clear();
        self.ever_saw_input = false;
        for aggregator in &mut self.aggregators {
            aggregator.reset();
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<SharedRow>> {
        self.base.begin_next()?;
        let _tap = self.base.context.tap(TAP_NEXT);
        self.advance().inspect_err(|_| self.abort())
    }

    fn close(&mut self) -> Result<()> {
        self.base.close()?;
        self.lookahead.release();
        self.key.clear();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.lookahead.release();
        self.base.destroy()
    }

    fn state(&self) -> CursorState {
        self.base.state
    }

    fn open_bindings(&mut self) -> Result<()> {
        self.base.open_bindings()
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        self.base.next_bindings()
    }

    fn close_bindings(&mut self) -> Result<()> {
        self.base.close_bindings()
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        self.lookahead.release();
        self.key.clear();
        self.base.cancel_bindings(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFunction;
    use crate::bindings::SingletonBindingsCursor;
    use crate::error::ValueError;
    use crate::store::MemoryStore;
    use crate::types::TypeClass;

    fn int_rows(row_type: &RowType, rows: &[&[i64]]) -> Vec<SharedRow> {
        rows.iter()
            .map(|r| {
                let values = r.iter().map(|v| Value::Bigint(*v)).collect();
                SharedRow::new(ValuesRow::new(row_type.clone(), values))
            })
            .collect()
    }

    fn context() -> Arc<QueryContext> {
        Arc::new(QueryContext::new(Arc::new(MemoryStore::new())))
    }

    fn drain(op: &Operator) -> Result<Vec<Vec<Value>>> {
        let ctx = context();
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty())?;
        cursor.open()?;
        let mut out = Vec::new();
        while let Some(row) = cursor.next()? {
            out.push(row.to_values()?);
        }
        Ok(out)
    }

    fn bigints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Bigint(*v)).collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_column_count_mismatch_rejected() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let scan = Operator::values_scan(row_type, Vec::new());
        let err = Operator::aggregate_partial(
            scan,
            2,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: inputs_index(=2) + aggregators(=1) != input row type columns(=2)"
        );
    }

    #[test]
    fn test_bad_aggregator_option_rejected() {
        let row_type = RowType::of(&[TypeClass::Text]);
        let scan = Operator::values_scan(row_type, Vec::new());
        let spec = AggregateFunction::GroupConcat
            .spec()
            .with_option(Value::Integer(1));
        assert!(Operator::aggregate_partial(scan, 0, vec![spec]).is_err());
    }

    #[test]
    fn test_output_row_type() {
        let row_type = RowType::new(vec![
            TypeClass::Text.into(),
            crate::types::TypeInstance::not_null(TypeClass::Integer),
            TypeClass::Integer.into(),
        ]);
        let scan = Operator::values_scan(row_type, Vec::new());
        let op = Operator::aggregate_partial(
            scan,
            1,
            vec![AggregateFunction::Sum.spec(), AggregateFunction::Count.spec()],
        )
        .unwrap();
        assert_eq!(
            op.row_type().to_string(),
            "(text, bigint, bigint NOT NULL)"
        );
    }

    #[test]
    fn test_display() {
        let make = |k: usize, n: usize| {
            let classes = vec![TypeClass::Bigint; k + n];
            let scan = Operator::values_scan(RowType::of(&classes), Vec::new());
            let specs = [AggregateFunction::Sum.spec(), AggregateFunction::Count.spec()];
            Operator::aggregate_partial(scan, k, specs[..n].to_vec())
                .unwrap()
                .to_string()
        };
        assert_eq!(make(0, 2), "Aggregation(without GROUP BY: [SUM, COUNT])");
        assert_eq!(make(1, 1), "Aggregation(GROUP BY 1 field, then: [SUM])");
        assert_eq!(make(2, 1), "Aggregation(GROUP BY 2 fields, then: [SUM])");
    }

    #[test]
    fn test_explain_grouping_option_is_key_width() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint, TypeClass::Bigint]);
        let scan = Operator::values_scan(row_type, Vec::new());
        let op = Operator::aggregate_partial(scan, 2, vec![AggregateFunction::Sum.spec()]).unwrap();
        assert_eq!(op.explain().get(Label::GroupingOption), Some("2"));
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[test]
    fn test_contiguous_runs() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let rows = int_rows(&row_type, &[&[1, 5], &[1, 10], &[2, 7], &[1, 1]]);
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, rows),
            1,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        assert_eq!(
            drain(&op).unwrap(),
            vec![bigints(&[1, 15]), bigints(&[2, 7]), bigints(&[1, 1])]
        );
    }

    #[test]
    fn test_signed_zero_keys_share_a_run() {
        let row_type = RowType::of(&[TypeClass::Double, TypeClass::Bigint]);
        let rows = [(0.0, 1), (-0.0, 2)]
            .into_iter()
            .map(|(key, n)| {
                SharedRow::new(ValuesRow::new(
                    row_type.clone(),
                    vec![Value::Double(key), Value::Bigint(n)],
                ))
            })
            .collect();
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, rows),
            1,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        assert_eq!(
            drain(&op).unwrap(),
            vec![vec![Value::Double(0.0), Value::Bigint(3)]]
        );
    }

    #[test]
    fn test_empty_input_without_grouping() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, Vec::new()),
            0,
            vec![AggregateFunction::Count.spec(), AggregateFunction::Sum.spec()],
        )
        .unwrap();
        assert_eq!(
            drain(&op).unwrap(),
            vec![vec![Value::Bigint(0), Value::Null]]
        );
    }

    #[test]
    fn test_empty_input_with_grouping() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, Vec::new()),
            1,
            vec![AggregateFunction::Count.spec()],
        )
        .unwrap();
        assert!(drain(&op).unwrap().is_empty());
    }

    #[test]
    fn test_closing_state_after_final_group() {
        let row_type = RowType::of(&[TypeClass::Bigint]);
        let rows = int_rows(&row_type, &[&[3]]);
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, rows),
            0,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        let ctx = context();
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty()).unwrap();
        cursor.open().unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().to_values().unwrap(), bigints(&[3]));
        assert_eq!(cursor.state(), CursorState::Closing);
        assert!(cursor.next().unwrap().is_none());
        assert!(cursor.is_idle());
    }

    #[test]
    fn test_overflow_closes_and_scopes_error() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let rows = int_rows(&row_type, &[&[1, i64::MAX], &[1, 1], &[2, 1]]);
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, rows),
            1,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        let ctx = context();
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty()).unwrap();
        cursor.open().unwrap();
        let err = cursor.next().unwrap_err();
        assert!(matches!(
            err,
            QueryError::Value {
                column: Some(1),
                source: ValueError::Overflow { .. }
            }
        ));
        assert!(cursor.is_idle());
        cursor.open().unwrap();
    }

    #[test]
    fn test_lookahead_released_on_close() {
        let row_type = RowType::of(&[TypeClass::Bigint, TypeClass::Bigint]);
        let rows = int_rows(&row_type, &[&[1, 1], &[2, 2]]);
        let second = rows[1].acquire();
        let op = Operator::aggregate_partial(
            Operator::values_scan(row_type, rows),
            1,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        let ctx = context();
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty()).unwrap();
        cursor.open().unwrap();
        cursor.next().unwrap().unwrap();
        // plan, test and lookahead
        assert_eq!(second.holders(), 3);
        cursor.close().unwrap();
        assert_eq!(second.holders(), 2);
    }
}
