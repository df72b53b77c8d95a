pub mod analyze;
pub mod bridge;
pub mod inspect;

pub use analyze::*;
pub use bridge::*;
pub use inspect::*;

use bindscope_core::graph::Graph;
use bindscope_core::model::ModuleData;

/// Render a graph as the human-readable listing printed by `analyze`.
pub fn render_graph(graph: &Graph) -> String {
    let stubs = graph.iter().filter(|node| node.module.is_stub()).count();
    let errors: usize = graph.iter().map(|node| node.errors.len()).sum();

    let mut out = String::new();
    out.push_str(&format!("Modules: {} ({} stubs)\n", graph.len(), stubs));
    out.push_str(&format!("Binding errors: {}\n", errors));
    for node in graph.iter() {
        out.push('\n');
        out.push_str(&render_module_line(&node.module));
        out.push('\n');
        for dep in &node.deps {
            let target = &graph.node(*dep).module;
            let version = target.version.map(|v| format!(" v{v}")).unwrap_or_default();
            out.push_str(&format!("  -> {}{}\n", target.binary_name, version));
        }
        for error in &node.errors {
            out.push_str(&format!("  !! {error}\n"));
        }
        if !node.module.loader_error.is_empty() {
            out.push_str(&format!("  ?? {}\n", node.module.loader_error));
        }
    }
    out
}

/// One-line summary of a module's identity.
pub fn render_module_line(module: &ModuleData) -> String {
    let version = module.version.map(|v| format!(" v{v}")).unwrap_or_default();
    let location = module
        .file_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(stub)".to_string());
    format!(
        "{}{} [{:?}, {:?}] {}",
        module.binary_name, version, module.binary_kind, module.platform, location
    )
}
