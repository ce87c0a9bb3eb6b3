use std::collections::HashSet;
use std::mem::offset_of;
use std::time::Duration;

use frame_scheduler::{
    AccumulationLoopConfig, AccumulationLoopController, AccumulationStop, TileKernel,
};
use tiles::{FrameExtent, Tile, TileScheduler};

use super::*;

fn assert_vec_close(actual: [f32; 3], expected: [f32; 3]) {
    for axis in 0..3 {
        assert!(
            (actual[axis] - expected[axis]).abs() < 1e-5,
            "{actual:?} != {expected:?}"
        );
    }
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[test]
fn core_parameters_match_wgsl_layout() {
    assert_eq!(offset_of!(CoreParameters, tile_offset), 0);
    assert_eq!(offset_of!(CoreParameters, noise_offset), 8);
    assert_eq!(offset_of!(CoreParameters, resolution), 16);
    assert_eq!(offset_of!(CoreParameters, tile_size), 24);
    assert_eq!(offset_of!(CoreParameters, max_distance), 40);
    assert_eq!(offset_of!(CoreParameters, fov), 52);
    assert_eq!(offset_of!(CoreParameters, basic_diffuse), 64);
    assert_eq!(offset_of!(CoreParameters, viewer_position), 80);
    assert_eq!(offset_of!(CoreParameters, basis_z), 128);
    assert_eq!(std::mem::size_of::<CoreParameters>(), 144);
}

#[test]
fn post_parameters_match_wgsl_layout() {
    assert_eq!(offset_of!(PostParameters, tonemap), 8);
    assert_eq!(offset_of!(PostParameters, exposure), 16);
    assert_eq!(offset_of!(PostParameters, frame_index), 20);
    assert_eq!(std::mem::size_of::<PostParameters>(), 32);
}

#[test]
fn core_parameters_carry_default_render_settings() {
    let settings = RenderSettings::default();
    let core = CoreParameters::new(&settings, FrameExtent::new(1920, 1080), 128);
    assert_eq!(core.tile_offset, [0, 0]);
    assert_eq!(core.resolution, [1920, 1080]);
    assert_eq!(core.tile_size, 128);
    assert_eq!(core.max_steps, 300);
    assert_eq!(core.max_bounces, 10);
    assert_eq!(core.max_distance, 5.0);
    assert_eq!(core.epsilon, 0.001);
    assert_eq!(core.fov, 0.152);
    assert_eq!(core.basis_x, [1.0, 0.0, 0.0, 0.0]);
    assert_eq!(core.basis_z, [0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn camera_basis_without_rotation_is_identity() {
    let [x, y, z] = camera_basis([0.0, 0.0, 0.0]);
    assert_eq!(x, [1.0, 0.0, 0.0]);
    assert_eq!(y, [0.0, 1.0, 0.0]);
    assert_eq!(z, [0.0, 0.0, 1.0]);
}

#[test]
fn camera_basis_quarter_turn_about_y_swings_forward_to_x() {
    let [x, y, z] = camera_basis([0.0, std::f32::consts::FRAC_PI_2, 0.0]);
    assert_vec_close(x, [0.0, 0.0, -1.0]);
    assert_vec_close(y, [0.0, 1.0, 0.0]);
    assert_vec_close(z, [1.0, 0.0, 0.0]);
}

#[test]
fn camera_basis_stays_orthonormal() {
    for rotation in [[0.3, -1.1, 2.0], [1.4, 0.2, -0.7], [-2.9, 3.0, 0.05]] {
        let basis = camera_basis(rotation);
        for (i, a) in basis.iter().enumerate() {
            assert!((dot(*a, *a) - 1.0).abs() < 1e-5, "{rotation:?}");
            for b in basis.iter().skip(i + 1) {
                assert!(dot(*a, *b).abs() < 1e-5, "{rotation:?}");
            }
        }
    }
}

#[test]
fn tonemap_and_dither_modes_parse_case_insensitively() {
    assert_eq!("ACES".parse::<TonemapMode>(), Ok(TonemapMode::Aces));
    assert_eq!("reinhard".parse::<TonemapMode>(), Ok(TonemapMode::Reinhard));
    assert_eq!("Noise".parse::<DitherMode>(), Ok(DitherMode::Noise));
    let error = "filmic".parse::<TonemapMode>().expect_err("unknown tonemap");
    assert!(error.to_string().contains("filmic"));
    assert_eq!(TonemapMode::None.gpu_code(), 0);
    assert_eq!(DitherMode::Ordered.gpu_code(), 1);
}

fn create_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;
        Some(
            request_renderer_device(&adapter)
                .await
                .expect("request wgpu device"),
        )
    })
}

fn fast_settings() -> RenderSettings {
    RenderSettings {
        max_steps: 48,
        max_bounces: 2,
        ..RenderSettings::default()
    }
}

fn patient_controller() -> AccumulationLoopController {
    AccumulationLoopController::new(AccumulationLoopConfig {
        max_poll_attempts: u32::MAX,
        poll_timeout: Duration::from_secs(20),
    })
}

fn read_sample_counts(device: &wgpu::Device, queue: &wgpu::Queue, scene: &SceneCompute) -> Vec<f32> {
    let size = scene.accumulation_buffer().size();
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("accumulation readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("accumulation readback"),
    });
    encoder.copy_buffer_to_buffer(scene.accumulation_buffer(), 0, &readback, 0, size);
    queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).expect("map callback send");
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("device poll");
    receiver
        .recv()
        .expect("map callback recv")
        .expect("map accumulation readback");
    let texels: Vec<[f32; 4]> = bytemuck::cast_slice(&slice.get_mapped_range()).to_vec();
    readback.unmap();
    texels.into_iter().map(|texel| texel[3]).collect()
}

#[test]
fn scene_compute_rejects_tile_sizes_off_the_workgroup_grid() {
    let Some((device, queue)) = create_device_queue() else {
        eprintln!("skipping: no wgpu adapter");
        return;
    };
    let result = SceneCompute::new(
        &device,
        &queue,
        FrameExtent::new(64, 64),
        12,
        &fast_settings(),
    );
    assert!(matches!(
        result,
        Err(RendererError::InvalidTileSize { tile_size: 12 })
    ));
}

#[test]
fn one_pass_accumulates_exactly_one_sample_per_pixel() {
    let Some((device, queue)) = create_device_queue() else {
        eprintln!("skipping: no wgpu adapter");
        return;
    };
    // Not tile aligned on either axis, so edge tiles are partial.
    let extent = FrameExtent::new(100, 70);
    let tile_size = 32;
    let mut scene = SceneCompute::new(&device, &queue, extent, tile_size, &fast_settings())
        .expect("scene compute");
    let mut scheduler = TileScheduler::with_seed(extent, tile_size, 17).expect("scheduler");
    let mut controller = patient_controller();

    scene.clear_accumulation();
    let report = controller
        .run_accumulation_budget(60_000.0, &mut scheduler, &mut scene)
        .expect("accumulation");
    assert_eq!(report.stop_reason, AccumulationStop::PassLimitReached);
    assert_eq!(report.tiles_dispatched as usize, scheduler.tile_count());
    assert_eq!(report.passes_completed, 1);

    let counts = read_sample_counts(&device, &queue, &scene);
    assert_eq!(counts.len() as u64, extent.pixel_count());
    assert!(counts.iter().all(|count| *count == 1.0));
}

#[test]
fn preview_resets_sample_counts_and_tiles_write_only_their_region() {
    let Some((device, queue)) = create_device_queue() else {
        eprintln!("skipping: no wgpu adapter");
        return;
    };
    let extent = FrameExtent::new(80, 48);
    let tile_size = 32;
    let mut scene = SceneCompute::new(&device, &queue, extent, tile_size, &fast_settings())
        .expect("scene compute");

    scene.dispatch_preview();
    let counts = read_sample_counts(&device, &queue, &scene);
    assert!(counts.iter().all(|count| *count == 0.0));

    let tile = Tile::new(64, 32);
    scene.dispatch_tile(tile);
    scene.dispatch_tile(tile);
    let counts = read_sample_counts(&device, &queue, &scene);

    let (width, height) = tile.clamped_extent(tile_size, extent);
    let mut touched = HashSet::new();
    for y in tile.y..tile.y + height {
        for x in tile.x..tile.x + width {
            touched.insert((y * extent.width + x) as usize);
        }
    }
    for (index, count) in counts.iter().enumerate() {
        let expected = if touched.contains(&index) { 2.0 } else { 0.0 };
        assert_eq!(*count, expected, "texel {index}");
    }
}

#[test]
fn resize_reallocates_a_zeroed_accumulation_buffer() {
    let Some((device, queue)) = create_device_queue() else {
        eprintln!("skipping: no wgpu adapter");
        return;
    };
    let mut scene = SceneCompute::new(
        &device,
        &queue,
        FrameExtent::new(32, 32),
        32,
        &fast_settings(),
    )
    .expect("scene compute");
    scene.dispatch_tile(Tile::new(0, 0));

    let resized = FrameExtent::new(40, 24);
    scene.resize(resized).expect("resize");
    assert_eq!(scene.extent(), resized);

    let counts = read_sample_counts(&device, &queue, &scene);
    assert_eq!(counts.len(), 40 * 24);
    assert!(counts.iter().all(|count| *count == 0.0));

    assert!(matches!(
        scene.resize(FrameExtent::new(0, 24)),
        Err(RendererError::EmptyFrame {
            width: 0,
            height: 24
        })
    ));
}
