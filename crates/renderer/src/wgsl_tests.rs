use crate::{
    DISPLAY_BLIT_SHADER, PATHTRACE_TILE_SHADER, POSTPROCESS_SHADER, PREVIEW_RAYMARCH_SHADER,
};

#[test]
fn renderer_wgsl_sources_parse_and_validate() {
    check_wgsl("preview_raymarch.wgsl", PREVIEW_RAYMARCH_SHADER);
    check_wgsl("pathtrace_tile.wgsl", PATHTRACE_TILE_SHADER);
    check_wgsl("postprocess.wgsl", POSTPROCESS_SHADER);
    check_wgsl("display_blit.wgsl", DISPLAY_BLIT_SHADER);
}

#[test]
fn compute_kernels_expose_main_with_tile_workgroup_size() {
    for (label, source) in [
        ("preview_raymarch.wgsl", PREVIEW_RAYMARCH_SHADER),
        ("pathtrace_tile.wgsl", PATHTRACE_TILE_SHADER),
        ("postprocess.wgsl", POSTPROCESS_SHADER),
    ] {
        let module = parse_wgsl(label, source);
        let entry_point = module
            .entry_points
            .iter()
            .find(|entry_point| entry_point.name == "main")
            .unwrap_or_else(|| panic!("{label} has no main entry point"));
        assert_eq!(entry_point.stage, naga::ShaderStage::Compute, "{label}");
        assert_eq!(
            entry_point.workgroup_size,
            [tiles::TILE_WORKGROUP_EDGE, tiles::TILE_WORKGROUP_EDGE, 1],
            "{label}"
        );
    }
}

fn parse_wgsl(label: &str, source: &str) -> naga::Module {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    })
}

fn check_wgsl(label: &str, source: &str) {
    let module = parse_wgsl(label, source);
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|error| {
        panic!(
            "WGSL validation failed for {label}: {}",
            error.emit_to_string(source)
        )
    });
}
