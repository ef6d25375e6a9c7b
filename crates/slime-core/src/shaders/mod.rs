/// Decay/diffuse step shader (entry `main`)
pub fn decay() -> &'static str {
    include_str!("decay.wgsl")
}

/// Agent step shader (entries `deposit` and `composite`)
pub fn agent_step() -> &'static str {
    include_str!("agent_step.wgsl")
}

/// Field render shader (entries `vs_main` and `fs_main`)
pub fn render() -> &'static str {
    include_str!("render.wgsl")
}
