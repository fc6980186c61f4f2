use swc_core::{
    common::{errors::HANDLER, SourceMapper},
    ecma::ast::Program,
    plugin::{plugin_transform, proxies::TransformPluginProgramMetadata},
};

pub mod config;
pub mod error;
pub mod exclusion;
pub mod instrument;
pub mod names;
pub mod synth;
pub mod tracker;
pub mod walker;

pub use config::InstrumentConfig;
pub use error::Error;
pub use instrument::{CallProbe, InstrumentContext, LoopKind};
pub use walker::{instrument_program, TreeWalker};

// -----------------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------------

#[plugin_transform]
pub fn process_transform(program: Program, metadata: TransformPluginProgramMetadata) -> Program {
    let raw_config = metadata.get_transform_plugin_config();
    let config = InstrumentConfig::from_json_or_default(raw_config.as_deref());

    let source_map: &dyn SourceMapper = &metadata.source_map;
    let engine = CallProbe::new(config, Some(source_map));
    let mut cx = InstrumentContext::for_program(&program);

    let mut out = program.clone();
    match instrument_program(&mut out, &engine, &mut cx) {
        Ok(()) => out,
        Err(err) => {
            HANDLER.with(|handler| handler.struct_err(&err.to_string()).emit());
            program
        }
    }
}
