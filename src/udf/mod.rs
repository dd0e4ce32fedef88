//! DataFusion scalar functions over geometry blobs.
//!
//! Every function is described by a static [`FunctionDef`]: its SQL name, the argument lists it
//! accepts (one per arity), its output type and the kernel that runs it. [`GeometryUdf`] turns a
//! definition into a [`ScalarUDFImpl`].

mod accessors;
mod constructors;
mod io;
mod measurement;

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arrow_schema::{DataType, Field};
use datafusion::error::Result;
use datafusion::logical_expr::scalar_doc_sections::DOC_SECTION_OTHER;
use datafusion::logical_expr::{
    ColumnarValue, Documentation, ScalarFunctionArgs, ScalarUDF, ScalarUDFImpl, Signature,
    Volatility,
};
use datafusion::prelude::SessionContext;
use log::trace;

use crate::codec;
use crate::config::GeometryOptions;
use crate::error::{GeoBlobError, GeoBlobResult};
use crate::handle::GeometryHandle;

/// Register every geometry function on `ctx`.
///
/// Output defaults are taken from the [`GeometryOptions`] of the session at the time of the
/// call.
pub fn register_udfs(ctx: &SessionContext) {
    let options = GeometryOptions::from_session_config(&ctx.copied_config());
    for udf in udfs(&options) {
        ctx.register_udf(udf);
    }
}

/// Every geometry function, configured with `options`.
pub fn udfs(options: &GeometryOptions) -> Vec<ScalarUDF> {
    all_functions()
        .map(|def| ScalarUDF::new_from_impl(GeometryUdf::new(def, options.clone())))
        .collect()
}

fn all_functions() -> impl Iterator<Item = &'static FunctionDef> {
    constructors::FUNCTIONS
        .iter()
        .chain(io::FUNCTIONS)
        .chain(accessors::FUNCTIONS)
        .chain(measurement::FUNCTIONS)
}

/// The logical type of one declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgType {
    /// A geometry blob, or raw WKB bytes.
    Geometry,
    /// A list of geometry blobs.
    GeometryList,
    Float64,
    Int32,
    Boolean,
    Utf8,
}

impl ArgType {
    fn data_type(&self) -> DataType {
        match self {
            ArgType::Geometry => DataType::Binary,
            ArgType::GeometryList => binary_list(),
            ArgType::Float64 => DataType::Float64,
            ArgType::Int32 => DataType::Int32,
            ArgType::Boolean => DataType::Boolean,
            ArgType::Utf8 => DataType::Utf8,
        }
    }

    /// The type an argument of type `actual` is cast to, or `None` if it is not accepted.
    ///
    /// Dictionary encoding is kept so that the binder sees the selection.
    fn coerce(&self, actual: &DataType) -> Option<DataType> {
        if let DataType::Dictionary(key, value) = actual {
            return match self {
                ArgType::Geometry | ArgType::Utf8 => self
                    .coerce(value)
                    .map(|value| DataType::Dictionary(key.clone(), Box::new(value))),
                _ => None,
            };
        }
        if actual == &DataType::Null {
            return Some(self.data_type());
        }
        let accepted = match self {
            ArgType::Geometry => matches!(
                actual,
                DataType::Binary
                    | DataType::LargeBinary
                    | DataType::BinaryView
                    | DataType::FixedSizeBinary(_)
            ),
            ArgType::GeometryList => match actual {
                DataType::List(field)
                | DataType::LargeList(field)
                | DataType::FixedSizeList(field, _) => {
                    !matches!(field.data_type(), DataType::Dictionary(_, _))
                        && ArgType::Geometry.coerce(field.data_type()).is_some()
                }
                _ => false,
            },
            ArgType::Float64 => actual.is_numeric(),
            ArgType::Int32 => actual.is_integer(),
            ArgType::Boolean => actual == &DataType::Boolean,
            ArgType::Utf8 => matches!(
                actual,
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ),
        };
        accepted.then(|| self.data_type())
    }
}

/// The logical type of a function's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputType {
    Binary,
    BinaryList,
    Utf8,
    Float64,
    Int32,
    Boolean,
}

impl OutputType {
    fn data_type(&self) -> DataType {
        match self {
            OutputType::Binary => DataType::Binary,
            OutputType::BinaryList => binary_list(),
            OutputType::Utf8 => DataType::Utf8,
            OutputType::Float64 => DataType::Float64,
            OutputType::Int32 => DataType::Int32,
            OutputType::Boolean => DataType::Boolean,
        }
    }
}

fn binary_list() -> DataType {
    DataType::List(Arc::new(Field::new_list_field(DataType::Binary, true)))
}

/// Runs a function over one call's arguments. The argument count has already been checked
/// against the definition.
pub(crate) type Kernel =
    fn(&[ColumnarValue], usize, &GeometryOptions) -> GeoBlobResult<ColumnarValue>;

/// Static description of one SQL function.
#[derive(Debug)]
pub(crate) struct FunctionDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Accepted argument lists, at most one per arity.
    pub arguments: &'static [&'static [ArgType]],
    pub output: OutputType,
    pub kernel: Kernel,
    pub description: &'static str,
    pub syntax: &'static str,
    pub argument_docs: &'static [(&'static str, &'static str)],
    pub sql_example: Option<&'static str>,
}

impl FunctionDef {
    fn arguments_for(&self, count: usize) -> Option<&'static [ArgType]> {
        self.arguments
            .iter()
            .find(|arguments| arguments.len() == count)
            .copied()
    }
}

/// A [`ScalarUDFImpl`] backed by a [`FunctionDef`].
#[derive(Debug)]
pub(crate) struct GeometryUdf {
    def: &'static FunctionDef,
    aliases: Vec<String>,
    options: GeometryOptions,
    signature: Signature,
    documentation: Documentation,
}

impl GeometryUdf {
    pub fn new(def: &'static FunctionDef, options: GeometryOptions) -> Self {
        let mut documentation =
            Documentation::builder(DOC_SECTION_OTHER, def.description, def.syntax);
        for (name, description) in def.argument_docs {
            documentation = documentation.with_argument(*name, *description);
        }
        if let Some(example) = def.sql_example {
            documentation = documentation.with_sql_example(example);
        }
        Self {
            def,
            aliases: def.aliases.iter().map(|alias| alias.to_string()).collect(),
            options,
            signature: Signature::user_defined(Volatility::Immutable),
            documentation: documentation.build(),
        }
    }

    fn check_arity(&self, count: usize) -> GeoBlobResult<&'static [ArgType]> {
        self.def.arguments_for(count).ok_or_else(|| {
            GeoBlobError::invalid_argument(format!(
                "{} does not take {count} arguments",
                self.def.name
            ))
        })
    }

    /// Run the function over already coerced arguments.
    pub fn call(&self, args: &[ColumnarValue], num_rows: usize) -> GeoBlobResult<ColumnarValue> {
        self.check_arity(args.len())?;
        trace!(
            "{} with {} arguments over {num_rows} rows",
            self.def.name,
            args.len()
        );
        (self.def.kernel)(args, num_rows, &self.options)
    }
}

impl PartialEq for GeometryUdf {
    fn eq(&self, other: &Self) -> bool {
        self.def.name == other.def.name && self.options == other.options
    }
}

impl Eq for GeometryUdf {}

impl Hash for GeometryUdf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.def.name.hash(state);
    }
}

impl ScalarUDFImpl for GeometryUdf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        self.def.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(self.def.output.data_type())
    }

    fn coerce_types(&self, arg_types: &[DataType]) -> Result<Vec<DataType>> {
        let expected = self.check_arity(arg_types.len())?;
        let coerced = arg_types
            .iter()
            .zip(expected)
            .enumerate()
            .map(|(i, (actual, expected))| {
                expected.coerce(actual).ok_or_else(|| {
                    GeoBlobError::invalid_argument(format!(
                        "{} argument {} must be {expected:?}, got {actual}",
                        self.def.name,
                        i + 1
                    ))
                })
            })
            .collect::<GeoBlobResult<Vec<_>>>()?;
        Ok(coerced)
    }

    fn invoke_with_args(&self, args: ScalarFunctionArgs) -> Result<ColumnarValue> {
        Ok(self.call(&args.args, args.number_rows)?)
    }

    fn documentation(&self) -> Option<&Documentation> {
        Some(&self.documentation)
    }
}

/// Decode a blob that is known to be non-empty.
fn decode_present(blob: &[u8]) -> GeoBlobResult<GeometryHandle> {
    codec::decode(blob)?.ok_or_else(|| GeoBlobError::parse("unexpected zero-length geometry"))
}
