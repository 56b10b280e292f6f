pub use bindle_core::*;

/// A configured bundler instance wrapping one single-use [`Graph`].
pub struct Bindle {
    pub graph: Graph,
}

impl Bindle {
    /// Run the build: fetch the module graph, link bindings, order
    /// execution, tree-shake, and partition into chunks.
    pub async fn build(&mut self) -> Result<BuildOutput, BuildError> {
        self.graph.build().await
    }

    /// Snapshot the warm-start cache for the next build.
    pub fn get_cache(&self) -> BuildCache {
        self.graph.get_cache()
    }

    /// Forward a file change notification from the host's watcher.
    pub fn watch_change(&mut self, id: &str) {
        self.graph.watch_change(id);
    }
}

pub fn bindle(options: InputOptions, plugins: Vec<Box<dyn Plugin>>) -> Bindle {
    Bindle {
        graph: Graph::new(options, plugins),
    }
}
