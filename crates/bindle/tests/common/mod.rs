use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bindle::{
    bindle, Bindle, InputItem, InputOptions, LoadArgs, LoadOutput, Plugin, PluginContext,
    PluginResult, TransformArgs, TransformOutput,
};

pub const ROOT: &str = "/virtual";

/// Serves module source from an in-memory map through the `load` hook, so
/// tests drive the whole pipeline without touching the file system.
#[derive(Debug)]
pub struct VirtualFs {
    files: HashMap<String, String>,
}

impl VirtualFs {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, code)| (format!("{}/{}", ROOT, name), code.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl Plugin for VirtualFs {
    fn name(&self) -> &'static str {
        "virtual-fs"
    }

    async fn load(
        &self,
        _ctx: &PluginContext,
        args: LoadArgs<'_>,
    ) -> PluginResult<Option<LoadOutput>> {
        Ok(self.files.get(args.id).cloned().map(LoadOutput::from))
    }
}

/// Counts how often the transform hook actually runs; warm cache hits skip
/// the whole chain.
#[derive(Debug)]
pub struct TransformCounter {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for TransformCounter {
    fn name(&self) -> &'static str {
        "transform-counter"
    }

    async fn transform(
        &self,
        _ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> PluginResult<Option<TransformOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(TransformOutput::from(args.code)))
    }
}

pub fn options_for(entries: &[(&str, &str)]) -> InputOptions {
    InputOptions {
        input: entries
            .iter()
            .map(|(name, import)| InputItem::new(*name, *import))
            .collect(),
        root: ROOT.to_string(),
        ..Default::default()
    }
}

pub fn fixture(entries: &[(&str, &str)], files: &[(&str, &str)]) -> Bindle {
    bindle(options_for(entries), vec![Box::new(VirtualFs::new(files))])
}

pub fn fixture_with(
    mut options: InputOptions,
    entries: &[(&str, &str)],
    files: &[(&str, &str)],
) -> Bindle {
    options.input = entries
        .iter()
        .map(|(name, import)| InputItem::new(*name, *import))
        .collect();
    options.root = ROOT.to_string();
    bindle(options, vec![Box::new(VirtualFs::new(files))])
}

pub fn module_id(name: &str) -> bindle::JsWord {
    format!("{}/{}", ROOT, name).as_str().into()
}
