use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Scalar as ArrowScalar};
use arrow::compute::kernels::{boolean, cmp, numeric, zip};
use arrow::compute::CastOptions;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::expr::{Expr as E, Operator, Scalar, UnaryOperator};
use crate::{Expr, FrameError, Result};

/// Evaluate `expr` for every row in `batch` and return the resulting Arrow array.
pub fn evaluate(expr: &Expr, batch: &RecordBatch) -> Result<ArrayRef> {
    match expr {
        E::Column(name) => {
            let idx = batch
                .schema()
                .fields()
                .iter()
                .position(|f| f.name() == name)
                .ok_or_else(|| FrameError::column_not_found(name.clone()))?;
            Ok(batch.column(idx).clone())
        }
        E::Literal(s) => Ok(s.to_array(batch.num_rows())),
        E::Alias { expr, .. } => evaluate(expr, batch),
        E::Wildcard => Err(FrameError::invalid_operation(
            "wildcard cannot be evaluated as a standalone expression",
        )),
        E::UnaryOp { op, expr } => {
            let v = evaluate(expr, batch)?;
            eval_unary(*op, &v)
        }
        E::BinaryOp { left, op, right } => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            let (l, r) = coerce_numeric(l, r)?;
            eval_binary(op, &l, &r)
        }
        E::Cast { expr, dtype } => {
            let v = evaluate(expr, batch)?;
            cast_strict(&v, dtype)
        }
        E::FillNull { expr, value } => {
            let v = evaluate(expr, batch)?;
            fill_null(&v, value)
        }
        E::Apply { expr, func } => {
            let v = evaluate(expr, batch)?;
            let out = func.call(&v)?;
            if out.len() != v.len() {
                return Err(FrameError::shape_mismatch(format!(
                    "host function '{}' returned {} values for {} rows",
                    func.name(),
                    out.len(),
                    v.len()
                )));
            }
            Ok(out)
        }
        E::Agg { .. } => Err(FrameError::invalid_operation(
            "aggregation expressions must be evaluated by an aggregation",
        )),
    }
}

/// Output column name of a projected expression.
pub fn output_name(expr: &Expr) -> String {
    match expr {
        E::Alias { name, .. } => name.clone(),
        E::Column(name) => name.clone(),
        E::Agg { expr, .. } => match expr.as_ref() {
            E::Column(name) => name.clone(),
            other => other.to_string(),
        },
        other => other.to_string(),
    }
}

/// Cast that fails on values that do not fit instead of nulling them.
pub fn cast_strict(array: &ArrayRef, dtype: &DataType) -> Result<ArrayRef> {
    if array.data_type() == dtype {
        return Ok(array.clone());
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    Ok(arrow::compute::cast_with_options(array, dtype, &options)?)
}

/// Replace nulls in `array` with `value` cast to the array's type.
pub fn fill_null(array: &ArrayRef, value: &Scalar) -> Result<ArrayRef> {
    if matches!(value, Scalar::Null) || array.null_count() == 0 {
        return Ok(array.clone());
    }
    let fill = arrow::compute::cast(&value.to_array(1), array.data_type())?;
    if fill.is_null(0) {
        // the literal has no representation in this column's type
        return Ok(array.clone());
    }
    let mask = arrow::compute::is_null(array.as_ref())?;
    let falsy = array.as_ref();
    Ok(zip::zip(&mask, &ArrowScalar::new(fill), &falsy)?)
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    use arrow::datatypes::DataType::*;
    matches!(
        dtype,
        Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 | Float32 | Float64
    )
}

pub(crate) fn is_float(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float16 | DataType::Float32 | DataType::Float64
    )
}

fn coerce_numeric(l: ArrayRef, r: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let (lt, rt) = (l.data_type().clone(), r.data_type().clone());
    if lt == rt {
        return Ok((l, r));
    }
    if rt == DataType::Null {
        let r = arrow::compute::cast(&r, &lt)?;
        return Ok((l, r));
    }
    if lt == DataType::Null {
        let l = arrow::compute::cast(&l, &rt)?;
        return Ok((l, r));
    }
    if !is_numeric(&lt) || !is_numeric(&rt) {
        return Ok((l, r));
    }
    let target = if is_float(&lt) || is_float(&rt) {
        DataType::Float64
    } else {
        DataType::Int64
    };
    Ok((cast_strict(&l, &target)?, cast_strict(&r, &target)?))
}

fn as_boolean(array: &ArrayRef) -> Result<&BooleanArray> {
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            FrameError::type_mismatch(
                None::<String>,
                DataType::Boolean.to_string(),
                array.data_type().to_string(),
            )
        })
}

fn eval_unary(op: UnaryOperator, v: &ArrayRef) -> Result<ArrayRef> {
    match op {
        UnaryOperator::Not => Ok(Arc::new(arrow::compute::not(as_boolean(v)?)?)),
        UnaryOperator::Neg => Ok(numeric::neg(v.as_ref())?),
        UnaryOperator::IsNull => Ok(Arc::new(arrow::compute::is_null(v.as_ref())?)),
        UnaryOperator::IsNotNull => Ok(Arc::new(arrow::compute::is_not_null(v.as_ref())?)),
    }
}

fn eval_binary(op: &Operator, lhs: &ArrayRef, rhs: &ArrayRef) -> Result<ArrayRef> {
    let l = lhs.as_ref();
    let r = rhs.as_ref();

    let out: ArrayRef = match op {
        Operator::Add => numeric::add(&l, &r)?,
        Operator::Sub => numeric::sub(&l, &r)?,
        Operator::Mul => numeric::mul(&l, &r)?,
        Operator::Div => numeric::div(&l, &r)?,
        Operator::Eq => Arc::new(cmp::eq(&l, &r)?),
        Operator::Neq => Arc::new(cmp::neq(&l, &r)?),
        Operator::Gt => Arc::new(cmp::gt(&l, &r)?),
        Operator::Lt => Arc::new(cmp::lt(&l, &r)?),
        Operator::Ge => Arc::new(cmp::gt_eq(&l, &r)?),
        Operator::Le => Arc::new(cmp::lt_eq(&l, &r)?),
        Operator::And => Arc::new(boolean::and_kleene(as_boolean(lhs)?, as_boolean(rhs)?)?),
        Operator::Or => Arc::new(boolean::or_kleene(as_boolean(lhs)?, as_boolean(rhs)?)?),
    };
    Ok(out)
}
