use std::time::Duration;

use shade_engine::backend::{Extent, HeadlessBackend, HeadlessConfig, LatencyModel, TextureFormat};
use shade_engine::barrier::ResourceState;
use shade_engine::cmd::Command;
use shade_engine::engine::{EngineConfig, RenderEngine, ViewportTexture};
use shade_engine::error::EngineError;
use shade_engine::geometry::{ColorFill, GeometryManager, Mesh, Transform};
use shade_engine::pipeline::{PipelineCreateInfo, PipelineState};
use shade_engine::scene::Camera;

fn engine_with(latency: LatencyModel, frames_in_flight: usize) -> RenderEngine<HeadlessBackend> {
    let backend = HeadlessBackend::new(HeadlessConfig {
        latency,
        ..Default::default()
    });
    let config = EngineConfig {
        frames_in_flight,
        upload_arena_size: 256 * 1024,
        geometry_arena_size: 256 * 1024,
        ..Default::default()
    };
    RenderEngine::new(backend, config).unwrap()
}

#[test]
fn copy_round_trip_pairs_every_barrier() {
    use ResourceState::*;

    let mut engine = engine_with(LatencyModel::Immediate, 1);
    let swapchain = *engine.swapchain();
    let mirror = ViewportTexture::new(&mut engine, swapchain.extent, swapchain.format).unwrap();

    let back = engine.request_frame().unwrap();
    mirror.copy_from(&mut engine, back).unwrap();
    engine.present_frame().unwrap();

    assert_eq!(
        engine.tracker().history(back).unwrap(),
        &[Present, RenderTarget, CopySource, RenderTarget, Present]
    );
    assert_eq!(
        engine.tracker().history(mirror.resource()).unwrap(),
        &[ShaderResource, CopyDest, ShaderResource]
    );

    // The submitted list carries the same transitions, in order.
    let frame = engine.device().executed().last().unwrap();
    let back_states: Vec<_> = frame
        .commands
        .iter()
        .filter_map(|c| match c {
            Command::Barrier(b) if b.resource == back => Some((b.before, b.after)),
            _ => None,
        })
        .collect();
    assert_eq!(
        back_states,
        [
            (Present, RenderTarget),
            (RenderTarget, CopySource),
            (CopySource, RenderTarget),
            (RenderTarget, Present),
        ]
    );
}

#[test]
fn pso_frame_runs_before_the_frame_list() {
    let mut engine = engine_with(LatencyModel::Fixed(Duration::from_millis(1)), 1);
    let swapchain = *engine.swapchain();

    let mut geometry = GeometryManager::new(&mut engine).unwrap();
    let cube = geometry.add_mesh(&mut engine, &Mesh::cube()).unwrap();
    geometry.add_drawable(cube, Transform::default()).unwrap();

    let mut pso = PipelineState::init(
        &mut engine,
        PipelineCreateInfo::mesh(swapchain.extent, swapchain.format),
    )
    .unwrap();
    let mirror = ViewportTexture::new(&mut engine, swapchain.extent, swapchain.format).unwrap();

    for _ in 0..3 {
        geometry.update_constants(&mut engine).unwrap();
        pso.update_camera(&mut engine, &Camera::default()).unwrap();

        let back = engine.request_frame().unwrap();
        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        mirror.copy_from(&mut engine, pso.render_target()).unwrap();
        mirror.copy_to(&mut engine, back).unwrap();
        engine.present_frame().unwrap();
    }

    let labels: Vec<_> = engine
        .device()
        .executed()
        .iter()
        .map(|l| l.label.as_str())
        .filter(|l| *l != "transfer")
        .collect();
    assert_eq!(labels, ["mesh", "frame 0", "mesh", "frame 0", "mesh", "frame 0"]);
    assert_eq!(engine.device().presents(), 3);

    // Everything is at rest once the last frame retired.
    let last = engine.submission().fence().last_signaled();
    assert!(engine.completed_value() >= last);
    for id in [pso.render_target(), mirror.resource()] {
        assert_eq!(
            engine.tracker().current(id).unwrap(),
            engine.tracker().baseline(id).unwrap()
        );
    }
}

#[test]
fn two_frames_in_flight_alternate_units() {
    let mut engine = engine_with(LatencyModel::Fixed(Duration::from_millis(10)), 2);

    for _ in 0..4 {
        engine.request_frame().unwrap();
        engine.present_frame().unwrap();
    }

    let labels: Vec<_> = engine.device().executed().iter().map(|l| l.label.clone()).collect();
    assert_eq!(labels, ["frame 0", "frame 1", "frame 0", "frame 1"]);
    assert_eq!(engine.submission().frames_submitted(), 4);

    engine.flush().unwrap();
    assert!(engine.completed_value() >= engine.submission().fence().last_signaled());
}

#[test]
fn mesh_upload_waits_for_the_frame_to_close() {
    let mut engine = engine_with(LatencyModel::Immediate, 1);
    let geometry = engine.geometry_arena().resource();
    let cursor = engine.geometry_arena().cursor();
    let lists = engine.device().executed().len();

    engine.request_frame().unwrap();
    engine.ensure_state(geometry, ResourceState::CopySource).unwrap();

    let err = engine.upload_mesh(&Mesh::cube(), ColorFill::default()).unwrap_err();
    assert!(matches!(err, EngineError::Frame(_)), "{err}");
    assert_eq!(engine.geometry_arena().cursor(), cursor);
    assert_eq!(engine.device().executed().len(), lists);

    // The frame still has to put the buffer back itself.
    assert!(matches!(
        engine.present_frame(),
        Err(EngineError::UnbalancedTransition { resource, .. }) if resource == geometry
    ));

    engine.request_frame().unwrap();
    engine.present_frame().unwrap();
    engine.upload_mesh(&Mesh::cube(), ColorFill::default()).unwrap();
    assert_eq!(
        engine.tracker().current(geometry).unwrap(),
        ResourceState::VertexAndConstant
    );
}

#[test]
fn lost_device_is_fatal() {
    let mut engine = engine_with(LatencyModel::Immediate, 1);
    engine.device_mut().lose_device();

    let err = engine.flush().unwrap_err();
    assert!(err.is_fatal(), "{err}");
}

#[test]
fn resize_keeps_the_frame_protocol_working() {
    let mut engine = engine_with(LatencyModel::Immediate, 1);
    let mut pso = PipelineState::init(
        &mut engine,
        PipelineCreateInfo::mesh(Extent::new(1280, 720), TextureFormat::Bgra8UnormSrgb),
    )
    .unwrap();

    engine.resize(800, 600).unwrap();
    pso.resize(&mut engine, Extent::new(800, 600)).unwrap();

    let back = engine.request_frame().unwrap();
    engine.copy_resource(back, pso.render_target()).unwrap();
    engine.present_frame().unwrap();

    assert_eq!(engine.swapchain().extent, Extent::new(800, 600));
    assert_eq!(pso.extent(), Extent::new(800, 600));
}
