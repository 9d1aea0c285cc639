//! Built-in steps. Thin on purpose: they exist so pipelines can be defined and
//! run without custom code, not to be a transformation library.

pub mod abort;
pub mod csv;
pub mod delay;
pub mod dummy;
pub mod filter;
pub mod generate;
pub mod select;
pub mod validate;

use crate::registry::Registry;
use crate::traits::Transform;

fn boxed<T: Transform + 'static>(t: T) -> Box<dyn Transform> {
    Box::new(t)
}

pub(crate) fn register_all(reg: &mut Registry) {
    reg.register("generate", |ctx| generate::Generate::from_context(ctx).map(boxed));
    reg.register("dummy", |_ctx| Ok(boxed(dummy::Dummy)));
    reg.register("filter", |ctx| filter::Filter::from_context(ctx).map(boxed));
    reg.register("select", |ctx| select::Select::from_context(ctx).map(boxed));
    reg.register("validate", |ctx| validate::Validate::from_context(ctx).map(boxed));
    reg.register("delay", |ctx| delay::Delay::from_context(ctx).map(boxed));
    reg.register("abort", |ctx| abort::Abort::from_context(ctx).map(boxed));
    reg.register("csv_input", |ctx| csv::CsvInput::from_context(ctx).map(boxed));
    reg.register("csv_output", |ctx| csv::CsvOutput::from_context(ctx).map(boxed));
}
