//! Row-wise execution of function bodies over DataFusion arguments.
//!
//! Each argument is bound once per call to one of three shapes:
//!
//! - flat: a plain array, logical row `i` is physical slot `i`;
//! - constant: a scalar, every logical row reads slot 0;
//! - selected: a dictionary array, whose keys map logical rows to slots of its values.
//!
//! A row whose argument is invalid (a null slot or a null key) produces a missing output without
//! calling the body. When every argument is constant the body runs once and the result is
//! returned as a scalar, which DataFusion broadcasts to the batch.

use std::sync::Arc;

use arrow_array::builder::{BinaryBuilder, ListBuilder};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int32Type};
use arrow_array::{
    Array, ArrayAccessor, ArrayRef, BinaryArray, BooleanArray, Float64Array, Int32Array,
    ListArray, StringArray,
};
use datafusion::logical_expr::ColumnarValue;
use datafusion::scalar::ScalarValue;
use log::trace;

use crate::error::{GeoBlobError, GeoBlobResult};

/// How logical rows map onto the physical values of one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Shape {
    Flat,
    Constant,
    /// Physical slot per logical row; `None` for a null key.
    Selected(Vec<Option<usize>>),
}

#[derive(Debug)]
struct BoundArg {
    values: ArrayRef,
    shape: Shape,
}

impl BoundArg {
    fn try_new(value: &ColumnarValue, num_rows: usize) -> GeoBlobResult<Self> {
        match value {
            ColumnarValue::Scalar(scalar) => {
                let mut scalar = scalar;
                while let ScalarValue::Dictionary(_, value) = scalar {
                    scalar = value.as_ref();
                }
                Ok(Self {
                    values: scalar.to_array_of_size(1)?,
                    shape: Shape::Constant,
                })
            }
            ColumnarValue::Array(array) => {
                if array.len() != num_rows {
                    return Err(GeoBlobError::invalid_argument(format!(
                        "argument has {} rows, expected {num_rows}",
                        array.len()
                    )));
                }
                match array.as_any_dictionary_opt() {
                    Some(dictionary) => {
                        let keys = dictionary.keys();
                        let selection = dictionary
                            .normalized_keys()
                            .into_iter()
                            .enumerate()
                            .map(|(row, slot)| keys.is_valid(row).then_some(slot))
                            .collect();
                        Ok(Self {
                            values: dictionary.values().clone(),
                            shape: Shape::Selected(selection),
                        })
                    }
                    None => Ok(Self {
                        values: array.clone(),
                        shape: Shape::Flat,
                    }),
                }
            }
        }
    }
}

/// One argument viewed through its shape with a concrete array type.
#[derive(Debug)]
pub(crate) struct Column<'a, A> {
    values: A,
    shape: &'a Shape,
}

impl<A: ArrayAccessor> Column<'_, A> {
    /// The value of logical row `row`, or `None` when the row is invalid.
    pub fn get(&self, row: usize) -> Option<A::Item> {
        let slot = match self.shape {
            Shape::Flat => row,
            Shape::Constant => 0,
            Shape::Selected(selection) => (*selection.get(row)?)?,
        };
        (slot < self.values.len() && self.values.is_valid(slot)).then(|| self.values.value(slot))
    }
}

/// Binds the arguments of one function call and drives a body over its rows.
#[derive(Debug)]
pub(crate) struct BatchBinder {
    args: Vec<BoundArg>,
    num_rows: usize,
    constant: bool,
}

impl BatchBinder {
    pub fn try_new(args: &[ColumnarValue], num_rows: usize) -> GeoBlobResult<Self> {
        let args = args
            .iter()
            .map(|arg| BoundArg::try_new(arg, num_rows))
            .collect::<GeoBlobResult<Vec<_>>>()?;
        let constant = args.iter().all(|arg| arg.shape == Shape::Constant);
        trace!(
            "bound {} arguments over {num_rows} rows ({})",
            args.len(),
            if constant { "constant" } else { "per-row" }
        );
        Ok(Self {
            args,
            num_rows,
            constant,
        })
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    /// Whether every argument is a single value shared by all rows.
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Number of times the body runs: once for a constant call, once per row otherwise.
    pub fn num_iterations(&self) -> usize {
        if self.is_constant() {
            1
        } else {
            self.num_rows
        }
    }

    fn arg(&self, index: usize) -> GeoBlobResult<&BoundArg> {
        self.args.get(index).ok_or_else(|| {
            GeoBlobError::invalid_argument(format!(
                "argument {index} requested but the call has {}",
                self.args.len()
            ))
        })
    }

    fn column<'a, A>(
        &'a self,
        index: usize,
        expected: &str,
        cast: impl FnOnce(&'a ArrayRef) -> Option<A>,
    ) -> GeoBlobResult<Column<'a, A>> {
        let arg = self.arg(index)?;
        let values = cast(&arg.values).ok_or_else(|| {
            GeoBlobError::invalid_argument(format!(
                "argument {index} must be {expected}, got {}",
                arg.values.data_type()
            ))
        })?;
        Ok(Column {
            values,
            shape: &arg.shape,
        })
    }

    pub fn binary(&self, index: usize) -> GeoBlobResult<Column<'_, &BinaryArray>> {
        self.column(index, "Binary", |values| values.as_binary_opt::<i32>())
    }

    pub fn utf8(&self, index: usize) -> GeoBlobResult<Column<'_, &StringArray>> {
        self.column(index, "Utf8", |values| values.as_string_opt::<i32>())
    }

    pub fn float64(&self, index: usize) -> GeoBlobResult<Column<'_, &Float64Array>> {
        self.column(index, "Float64", |values| {
            values.as_primitive_opt::<Float64Type>()
        })
    }

    pub fn int32(&self, index: usize) -> GeoBlobResult<Column<'_, &Int32Array>> {
        self.column(index, "Int32", |values| values.as_primitive_opt::<Int32Type>())
    }

    pub fn boolean(&self, index: usize) -> GeoBlobResult<Column<'_, &BooleanArray>> {
        self.column(index, "Boolean", |values| values.as_boolean_opt())
    }

    pub fn list(&self, index: usize) -> GeoBlobResult<Column<'_, &ListArray>> {
        self.column(index, "List", |values| values.as_list_opt::<i32>())
    }

    /// Run a one-argument body over every row.
    pub fn execute1<A, O, F>(&self, a: &Column<'_, A>, mut op: F) -> GeoBlobResult<Vec<Option<O>>>
    where
        A: ArrayAccessor,
        F: FnMut(A::Item) -> GeoBlobResult<Option<O>>,
    {
        let mut rows = Vec::with_capacity(self.num_iterations());
        for row in 0..self.num_iterations() {
            let value = match a.get(row) {
                Some(a) => op(a)?,
                None => None,
            };
            rows.push(value);
        }
        Ok(rows)
    }

    /// Run a two-argument body over every row where both arguments are valid.
    pub fn execute2<A, B, O, F>(
        &self,
        a: &Column<'_, A>,
        b: &Column<'_, B>,
        mut op: F,
    ) -> GeoBlobResult<Vec<Option<O>>>
    where
        A: ArrayAccessor,
        B: ArrayAccessor,
        F: FnMut(A::Item, B::Item) -> GeoBlobResult<Option<O>>,
    {
        let mut rows = Vec::with_capacity(self.num_iterations());
        for row in 0..self.num_iterations() {
            let value = match (a.get(row), b.get(row)) {
                (Some(a), Some(b)) => op(a, b)?,
                _ => None,
            };
            rows.push(value);
        }
        Ok(rows)
    }

    /// Run a three-argument body over every row where all arguments are valid.
    pub fn execute3<A, B, C, O, F>(
        &self,
        a: &Column<'_, A>,
        b: &Column<'_, B>,
        c: &Column<'_, C>,
        mut op: F,
    ) -> GeoBlobResult<Vec<Option<O>>>
    where
        A: ArrayAccessor,
        B: ArrayAccessor,
        C: ArrayAccessor,
        F: FnMut(A::Item, B::Item, C::Item) -> GeoBlobResult<Option<O>>,
    {
        let mut rows = Vec::with_capacity(self.num_iterations());
        for row in 0..self.num_iterations() {
            let value = match (a.get(row), b.get(row), c.get(row)) {
                (Some(a), Some(b), Some(c)) => op(a, b, c)?,
                _ => None,
            };
            rows.push(value);
        }
        Ok(rows)
    }

    /// Assemble the output, as a scalar for a constant call and as an array otherwise.
    pub fn finish<O: OutputValue>(&self, rows: Vec<Option<O>>) -> GeoBlobResult<ColumnarValue> {
        let array = O::into_array(rows);
        if self.is_constant() {
            Ok(ColumnarValue::Scalar(ScalarValue::try_from_array(
                &array, 0,
            )?))
        } else {
            Ok(ColumnarValue::Array(array))
        }
    }
}

/// A value a function body can write to an output row.
pub(crate) trait OutputValue: Sized {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef;
}

impl OutputValue for Vec<u8> {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(BinaryArray::from_iter(rows))
    }
}

impl OutputValue for String {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(StringArray::from_iter(rows))
    }
}

impl OutputValue for f64 {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(Float64Array::from(rows))
    }
}

impl OutputValue for i32 {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(Int32Array::from(rows))
    }
}

impl OutputValue for bool {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(BooleanArray::from(rows))
    }
}

/// A list of blobs, as produced by `ST_Dump`.
impl OutputValue for Vec<Vec<u8>> {
    fn into_array(rows: Vec<Option<Self>>) -> ArrayRef {
        let mut builder = ListBuilder::new(BinaryBuilder::new());
        for row in rows {
            match row {
                Some(blobs) => {
                    for blob in blobs {
                        builder.values().append_value(blob);
                    }
                    builder.append(true);
                }
                None => builder.append(false),
            }
        }
        Arc::new(builder.finish())
    }
}
