// operators/aggregate.rs
// count / sum / min / max / avg
//
// An aggregate both exposes a one-row output document and the bare scalar
// for callers composing results.

use crate::document::Document;
use crate::error::ErrorCode;
use crate::expr::field_to_pointer;
use crate::plan::logical::AggregateKind;
use crate::value::ScalarValue;

use super::{Operator, OperatorContext, OperatorData};

pub struct AggregateOperator {
    kind: AggregateKind,
    /// Field the aggregate reads; ignored by `count`
    key: String,
    child: Box<dyn Operator>,
    output: OperatorData,
    value: Option<ScalarValue>,
}

impl AggregateOperator {
    pub fn new(kind: AggregateKind, key: impl Into<String>, child: Box<dyn Operator>) -> Self {
        AggregateOperator {
            kind,
            key: field_to_pointer(&key.into()),
            child,
            output: OperatorData::new(),
            value: None,
        }
    }

    /// The aggregated scalar itself.
    pub fn value(&self) -> Option<&ScalarValue> {
        self.value.as_ref()
    }

    fn aggregate(&self, input: &OperatorData) -> ScalarValue {
        match self.kind {
            AggregateKind::Count => ScalarValue::UInt(input.len() as u64),
            AggregateKind::Sum => self.sum(input),
            AggregateKind::Min => self
                .scalars(input)
                .min()
                .unwrap_or(ScalarValue::Null),
            AggregateKind::Max => self
                .scalars(input)
                .max()
                .unwrap_or(ScalarValue::Null),
            AggregateKind::Avg => {
                let values: Vec<f64> = self
                    .scalars(input)
                    .filter_map(|v| v.as_f64())
                    .collect();
                if values.is_empty() {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
        }
    }

    fn scalars<'a>(&'a self, input: &'a OperatorData) -> impl Iterator<Item = ScalarValue> + 'a {
        input
            .documents()
            .iter()
            .filter_map(|doc| doc.get_value(&self.key))
            .filter(|v| !v.is_null())
    }

    /// Integer sums stay integers; any float in the stream promotes the
    /// whole sum.
    fn sum(&self, input: &OperatorData) -> ScalarValue {
        let mut int_sum: i128 = 0;
        let mut float_sum = 0.0f64;
        let mut saw_float = false;
        let mut saw_value = false;
        for value in self.scalars(input) {
            match value {
                ScalarValue::Float(f) => {
                    saw_float = true;
                    saw_value = true;
                    float_sum += f;
                }
                other => {
                    if let Some(f) = other.as_f64() {
                        saw_value = true;
                        float_sum += f;
                        match &other {
                            ScalarValue::Int128(v) => int_sum += *v,
                            _ => {
                                if let Some(i) = other.as_i64() {
                                    int_sum += i128::from(i);
                                } else if let Some(u) = other.as_u64() {
                                    int_sum += i128::from(u);
                                }
                            }
                        }
                    }
                }
            }
        }
        if !saw_value {
            ScalarValue::Null
        } else if saw_float {
            ScalarValue::Float(float_sum)
        } else if let Ok(v) = i64::try_from(int_sum) {
            ScalarValue::Int(v)
        } else {
            ScalarValue::Int128(int_sum)
        }
    }
}

impl Operator for AggregateOperator {
    fn name(&self) -> &'static str {
        self.kind.key()
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let code = self.child.execute(ctx);
        if !code.is_success() {
            return code;
        }
        let empty = OperatorData::new();
        let input = self.child.output().unwrap_or(&empty);
        let value = self.aggregate(input);
        let row = Document::new();
        row.set(&format!("/{}", self.kind.key()), value.clone());
        self.output.append(row);
        self.value = Some(value);
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        self.child.trace(out);
        out.push(self.name().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionContext;
    use crate::operators::{Limit, ScanOperator};
    use crate::statement::{CollectionName, Parameters};

    fn ctx(counts: &[i64]) -> OperatorContext {
        let collection = CollectionContext::new(CollectionName::new("db", "coll"));
        {
            let mut storage = collection.storage().write();
            for (i, count) in counts.iter().enumerate() {
                storage.insert(
                    Document::from_json(&format!(
                        r#"{{"_id": "{:024}", "count": {}}}"#,
                        i, count
                    ))
                    .unwrap(),
                );
            }
        }
        OperatorContext {
            collection,
            parameters: Parameters::default(),
        }
    }

    fn aggregate(kind: AggregateKind, counts: &[i64]) -> AggregateOperator {
        let mut op = AggregateOperator::new(
            kind,
            "count",
            Box::new(ScanOperator::new(None, Limit::unlimited())),
        );
        assert_eq!(op.execute(&ctx(counts)), ErrorCode::Success);
        op
    }

    #[test]
    fn test_count() {
        let op = aggregate(AggregateKind::Count, &[1, 2, 3]);
        assert_eq!(op.value(), Some(&ScalarValue::UInt(3)));
        let row = &op.output().unwrap().documents()[0];
        assert_eq!(row.get_ulong("/count"), Some(3));
    }

    #[test]
    fn test_sum_min_max() {
        assert_eq!(
            aggregate(AggregateKind::Sum, &[1, 2, 3]).value(),
            Some(&ScalarValue::Int(6))
        );
        assert_eq!(
            aggregate(AggregateKind::Min, &[5, 2, 9]).value(),
            Some(&ScalarValue::Int(2))
        );
        assert_eq!(
            aggregate(AggregateKind::Max, &[5, 2, 9]).value(),
            Some(&ScalarValue::Int(9))
        );
    }

    #[test]
    fn test_avg() {
        assert_eq!(
            aggregate(AggregateKind::Avg, &[2, 4]).value(),
            Some(&ScalarValue::Float(3.0))
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            aggregate(AggregateKind::Count, &[]).value(),
            Some(&ScalarValue::UInt(0))
        );
        assert_eq!(
            aggregate(AggregateKind::Sum, &[]).value(),
            Some(&ScalarValue::Null)
        );
        assert_eq!(
            aggregate(AggregateKind::Min, &[]).value(),
            Some(&ScalarValue::Null)
        );
    }
}
