//! Capture a populated context and restore it into a fresh one.

use gleam::gl::{self, GLuint};

use gl_snapshot::blob::MemoryBlobs;
use gl_snapshot::caps::{ContextInfo, Limit};
use gl_snapshot::entry::EntryPoints;
use gl_snapshot::enums::{ACTIVE_PROGRAM, FRAGMENT_SHADER_BIT, PROGRAM_SEPARABLE};
use gl_snapshot::error::{PassError, RemapError};
use gl_snapshot::fake::FakeGl;
use gl_snapshot::namespace::Namespace;
use gl_snapshot::options::Options;
use gl_snapshot::remap::HandleRemapper;
use gl_snapshot::report::{EventKind, PassReport};
use gl_snapshot::snapshot::{ContextSnapshot, RESTORE_ORDER};
use gl_snapshot::state::sampling::ANISOTROPY_EXTENSION;
use gl_snapshot::state::ObjectState;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn info() -> ContextInfo {
    ContextInfo::new()
        .with_limit(Limit::MaxVertexAttribs, 8)
        .with_limit(Limit::MaxTextureSize, 64)
        .with_limit(Limit::MaxDrawBuffers, 4)
        .with_limit(Limit::MaxColorAttachments, 4)
        .with_extension(ANISOTROPY_EXTENSION)
}

struct Handles {
    vertices: GLuint,
    indices: GLuint,
    texture: GLuint,
    depth: GLuint,
    query: GLuint,
    program: GLuint,
    stage_program: GLuint,
    pipeline: GLuint,
    framebuffer: GLuint,
    vertex_array: GLuint,
}

/// Create one of everything, wired together the way a renderer would.
fn populate(gl: &FakeGl) -> Handles {
    let buffers = gl.gen_buffers(2);
    let (vertices, indices) = (buffers[0], buffers[1]);
    gl.bind_buffer(gl::ARRAY_BUFFER, vertices);
    gl.buffer_data(gl::ARRAY_BUFFER, &[7; 64], gl::STATIC_DRAW);
    gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, indices);
    gl.buffer_data(gl::ELEMENT_ARRAY_BUFFER, &[0, 0, 1, 0, 2, 0], gl::DYNAMIC_DRAW);

    let texture = gl.gen_textures(1)[0];
    gl.bind_texture(gl::TEXTURE_2D, texture);
    let pixels: Vec<u8> = (0..64).collect();
    gl.tex_image_2d(gl::TEXTURE_2D, 0, gl::RGBA8 as i32, 4, 4, 0, gl::RGBA, gl::UNSIGNED_BYTE, Some(&pixels));
    gl.tex_image_2d(gl::TEXTURE_2D, 1, gl::RGBA8 as i32, 2, 2, 0, gl::RGBA, gl::UNSIGNED_BYTE, Some(&pixels[..16]));
    gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR_MIPMAP_NEAREST as i32);
    gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
    gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAX_LEVEL, 1);
    gl.bind_texture(gl::TEXTURE_2D, 0);

    let depth = gl.gen_renderbuffers(1)[0];
    gl.bind_renderbuffer(gl::RENDERBUFFER, depth);
    gl.renderbuffer_storage_multisample(gl::RENDERBUFFER, 0, gl::DEPTH24_STENCIL8, 4, 4);
    gl.bind_renderbuffer(gl::RENDERBUFFER, 0);

    let sampler = gl.gen_samplers(1)[0];
    gl.sampler_parameter_i(sampler, gl::TEXTURE_MAG_FILTER, gl::NEAREST as i32);
    gl.sampler_parameter_fv(sampler, gl::TEXTURE_BORDER_COLOR, &[1.0, 0.5, 0.25, 1.0]);

    let query = gl.gen_queries(1)[0];
    gl.begin_query(gl::SAMPLES_PASSED, query);
    gl.end_query(gl::SAMPLES_PASSED);

    let vs = gl.create_shader(gl::VERTEX_SHADER);
    gl.shader_source(vs, "in vec4 pos;\nin vec2 uv;\nuniform mat4 transform;\nvoid main() {}\n");
    gl.compile_shader(vs);
    let fs = gl.create_shader(gl::FRAGMENT_SHADER);
    gl.shader_source(
        fs,
        "out vec4 color;\nuniform vec4 tint;\nuniform float weights[2];\nuniform sampler2D image;\n\
         layout(std140) uniform Lights {\n  vec4 light;\n};\nvoid main() {}\n",
    );
    gl.compile_shader(fs);
    let program = gl.create_program();
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.bind_attrib_location(program, 3, "uv");
    gl.link_program(program);
    let transform: Vec<f32> = (0..16).map(|i| i as f32 * 0.5).collect();
    gl.program_uniform_matrix_fv(program, gl.get_uniform_location(program, "transform"), 4, 4, &transform);
    gl.program_uniform_fv(program, gl.get_uniform_location(program, "tint"), 4, &[1.0, 0.5, 0.0, 1.0]);
    gl.program_uniform_fv(program, gl.get_uniform_location(program, "weights"), 1, &[0.25, f32::INFINITY]);
    gl.program_uniform_iv(program, gl.get_uniform_location(program, "image"), 1, &[2]);
    gl.uniform_block_binding(program, gl.get_uniform_block_index(program, "Lights"), 3);

    let stage_fs = gl.create_shader(gl::FRAGMENT_SHADER);
    gl.shader_source(stage_fs, "uniform uint mode;\nvoid main() {}\n");
    gl.compile_shader(stage_fs);
    let stage_program = gl.create_program();
    gl.program_parameter_i(stage_program, PROGRAM_SEPARABLE, 1);
    gl.attach_shader(stage_program, stage_fs);
    gl.link_program(stage_program);
    gl.program_uniform_uiv(stage_program, gl.get_uniform_location(stage_program, "mode"), 1, &[7]);

    let pipeline = gl.gen_program_pipelines(1)[0];
    gl.bind_program_pipeline(pipeline);
    gl.use_program_stages(pipeline, FRAGMENT_SHADER_BIT, stage_program);
    gl.active_shader_program(pipeline, stage_program);
    gl.bind_program_pipeline(0);

    gl.fence_sync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0);

    let framebuffer = gl.gen_framebuffers(1)[0];
    gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
    gl.framebuffer_texture_2d(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, texture, 0);
    gl.framebuffer_renderbuffer(gl::FRAMEBUFFER, gl::DEPTH_ATTACHMENT, gl::RENDERBUFFER, depth);
    gl.read_buffer(gl::NONE);
    gl.bind_framebuffer(gl::FRAMEBUFFER, 0);

    let vertex_array = gl.gen_vertex_arrays(1)[0];
    gl.bind_vertex_array(vertex_array);
    gl.bind_buffer(gl::ARRAY_BUFFER, vertices);
    gl.vertex_attrib_pointer(0, 3, gl::FLOAT, false, 20, 0);
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer(3, 2, gl::FLOAT, false, 20, 12);
    gl.enable_vertex_attrib_array(3);
    gl.vertex_attrib_divisor(3, 1);
    gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, indices);
    gl.bind_vertex_array(0);
    gl.bind_buffer(gl::ARRAY_BUFFER, 0);

    gl.vertex_attrib_4f(1, 0.5, 0.25, 0.125, 1.0);

    assert_eq!(gl.get_error(), gl::NO_ERROR);
    Handles {
        vertices,
        indices,
        texture,
        depth,
        query,
        program,
        stage_program,
        pipeline,
        framebuffer,
        vertex_array,
    }
}

fn capture(gl: &FakeGl) -> ContextSnapshot {
    let (snapshot, report) =
        ContextSnapshot::capture(gl, &gl.context_info(), &gl.inventory(), &Options::default()).unwrap();
    assert!(report.is_clean(), "{}", report);
    snapshot
}

fn restore(snapshot: &ContextSnapshot, target: &FakeGl, options: &Options) -> (HandleRemapper, PassReport) {
    let mut remapper = HandleRemapper::new();
    let report = snapshot
        .restore(target, &target.context_info(), &mut remapper, options)
        .unwrap();
    (remapper, report)
}

#[test]
fn round_trip_through_json() {
    init_logging();
    let source = FakeGl::new(&info());
    populate(&source);
    let snapshot = capture(&source);
    assert_eq!(snapshot.len(), 15);

    let mut blobs = MemoryBlobs::new();
    let text = snapshot.to_json(&mut blobs).unwrap();
    // Buffer contents and both texture levels went to the blob store.
    assert_eq!(blobs.len(), 4);

    let (loaded, report) = ContextSnapshot::from_json(&text, &blobs).unwrap();
    assert!(report.is_clean(), "{}", report);
    let comparison = snapshot.compare_restorable_state(&loaded);
    assert!(comparison.is_clean(), "{}", comparison);
    assert_eq!(comparison.succeeded, 16);
}

#[test]
fn restored_objects_capture_the_same() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    let snapshot = capture(&source);

    let target = FakeGl::new(&info()).with_first_name(500);
    let options = Options {
        verify_restore: true,
        ..Options::default()
    };
    let (remapper, report) = restore(&snapshot, &target, &options);
    assert!(report.is_clean(), "{}", report);
    assert_eq!(remapper.len(), snapshot.len());
    assert_eq!(target.live_object_count(), snapshot.len());

    // Capturing the restored context gives back the original, once handles
    // are translated.
    let again = capture(&target);
    for (ns, record) in snapshot.iter() {
        let mut expected = record.box_clone();
        expected.remap_handles(&remapper).unwrap();
        let live = remapper.remap(ns, record.recorded_handle()).unwrap();
        let actual = again.get(ns, live).unwrap();
        assert!(expected.compare_restorable_state(actual), "{} {}", ns, live);
    }
    assert!(remapper.remap(Namespace::Programs, handles.program).unwrap() >= 500);
}

#[test]
fn misordered_restore_is_rejected() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    let snapshot = capture(&source);

    let target = FakeGl::new(&info());
    let mut remapper = HandleRemapper::new();
    let order = [Namespace::Framebuffers, Namespace::Textures, Namespace::RenderBuffers];
    let result = snapshot.restore_in_order(&target, &info(), &mut remapper, &Options::default(), &order);
    match result {
        Err(PassError::DependencyOrder(RemapError::NotDeclared { namespace, handle })) => {
            assert_eq!(namespace, Namespace::Textures);
            assert_eq!(handle, handles.texture);
        }
        other => panic!("expected an ordering failure, got {:?}", other),
    }
    // The framebuffer resolves its references before creating anything.
    assert_eq!(target.live_object_count(), 0);
}

#[test]
fn forward_references_use_live_handles() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    let snapshot = capture(&source);

    let target = FakeGl::new(&info()).with_first_name(40);
    let mut remapper = HandleRemapper::new();
    let order = [Namespace::Buffers, Namespace::VertexArrays];
    let report = snapshot
        .restore_in_order(&target, &info(), &mut remapper, &Options::default(), &order)
        .unwrap();
    assert!(report.is_clean(), "{}", report);

    let vertices = remapper.remap(Namespace::Buffers, handles.vertices).unwrap();
    let indices = remapper.remap(Namespace::Buffers, handles.indices).unwrap();
    let vertex_array = remapper.remap(Namespace::VertexArrays, handles.vertex_array).unwrap();
    assert_ne!(vertices, handles.vertices);

    target.bind_vertex_array(vertex_array);
    assert_eq!(target.get_integer_v(gl::ELEMENT_ARRAY_BUFFER_BINDING) as GLuint, indices);
    assert_eq!(
        target.get_vertex_attrib_iv(3, gl::VERTEX_ATTRIB_ARRAY_BUFFER_BINDING) as GLuint,
        vertices
    );
    assert_eq!(target.get_vertex_attrib_iv(3, gl::VERTEX_ATTRIB_ARRAY_DIVISOR), 1);
    assert_eq!(target.get_vertex_attrib_pointer_v(3, gl::VERTEX_ATTRIB_ARRAY_POINTER), 12);
    assert_eq!(target.get_error(), gl::NO_ERROR);
}

#[test]
fn failed_restores_leave_nothing_behind() {
    init_logging();
    let source = FakeGl::new(&info());
    populate(&source);
    let snapshot = capture(&source);

    // The application's own query must stay active whatever happens to the
    // restored one.
    let running_target = || {
        let target = FakeGl::new(&info());
        let running = target.gen_queries(1)[0];
        target.begin_query(gl::SAMPLES_PASSED, running);
        (target, running)
    };

    let steps = {
        let (target, _) = running_target();
        let before = target.calls();
        restore(&snapshot, &target, &Options::default());
        target.calls() - before
    };
    assert!(steps > 20);

    for n in 1..=steps {
        let (target, running) = running_target();
        target.fail_after(Some(n));
        let (remapper, report) = restore(&snapshot, &target, &Options::default());
        assert_eq!(
            target.active_query(gl::SAMPLES_PASSED),
            running,
            "failure at call {}:\n{}",
            n,
            report
        );
        assert_eq!(
            target.live_object_count(),
            remapper.len() + 1,
            "failure at call {}:\n{}",
            n,
            report
        );
        for event in report.of_kind(EventKind::Failed) {
            if let Some(ns) = event.namespace {
                assert!(!remapper.is_declared(ns, event.handle), "{}", event);
                let theirs = if ns == Namespace::Queries { 1 } else { 0 };
                assert!(target.live_objects(ns).len() - theirs < snapshot.records(ns).count());
            }
        }
    }
}

#[test]
fn excluded_dependencies_fail_only_their_dependents() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    source.map_buffer(handles.vertices, true);

    let (snapshot, report) =
        ContextSnapshot::capture(&source, &info(), &source.inventory(), &Options::default()).unwrap();
    assert!(report.has(EventKind::Excluded, Some(Namespace::Buffers), handles.vertices));
    assert_eq!(report.events().len(), 1);

    let strict = Options {
        strict: true,
        ..Options::default()
    };
    assert!(matches!(
        ContextSnapshot::capture(&source, &info(), &source.inventory(), &strict),
        Err(PassError::Strict { .. })
    ));

    let target = FakeGl::new(&info());
    let (remapper, report) = restore(&snapshot, &target, &Options::default());
    // The vertex array used the excluded buffer; everything else is fine.
    assert!(report.has(EventKind::Failed, Some(Namespace::VertexArrays), handles.vertex_array));
    assert_eq!(report.of_kind(EventKind::Failed).count(), 1);
    assert!(remapper.is_declared(Namespace::Framebuffers, handles.framebuffer));
    assert!(remapper.is_declared(Namespace::RenderBuffers, handles.depth));
    assert!(remapper.is_declared(Namespace::Queries, handles.query));
    assert!(target.live_objects(Namespace::VertexArrays).is_empty());

    let target = FakeGl::new(&info());
    let mut remapper = HandleRemapper::new();
    assert!(matches!(
        snapshot.restore(&target, &info(), &mut remapper, &strict),
        Err(PassError::Strict { .. })
    ));
}

#[test]
fn every_namespace_is_restored_in_order() {
    let source = FakeGl::new(&info());
    populate(&source);
    let snapshot = capture(&source);
    let target = FakeGl::new(&info());
    let (remapper, _) = restore(&snapshot, &target, &Options::default());
    for &ns in RESTORE_ORDER.iter() {
        assert_eq!(target.live_objects(ns).len(), snapshot.records(ns).count(), "{}", ns);
    }
    assert_eq!(remapper.iter().count(), snapshot.len());
}

#[test]
fn active_queries_survive_restore() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    let snapshot = capture(&source);

    let target = FakeGl::new(&info()).with_first_name(900);
    let running = target.gen_queries(1)[0];
    target.begin_query(gl::SAMPLES_PASSED, running);

    let (remapper, report) = restore(&snapshot, &target, &Options::default());
    assert!(report.is_clean(), "{}", report);
    assert_eq!(target.active_query(gl::SAMPLES_PASSED), running);

    let restored = remapper.remap(Namespace::Queries, handles.query).unwrap();
    assert_ne!(restored, running);
    assert!(target.query_result(restored).is_some());
    assert_eq!(target.get_error(), gl::NO_ERROR);
}

#[test]
fn fewer_vertex_attributes_downgrade() {
    init_logging();
    let source = FakeGl::new(&info());
    source.vertex_attrib_4f(1, 0.5, 0.25, 0.125, 1.0);
    source.vertex_attrib_4f(7, 9.0, 9.0, 9.0, 9.0);
    let snapshot = capture(&source);
    assert_eq!(snapshot.current_vertex_attribs().map(|a| a.attribs().len()), Some(8));

    let smaller = info().with_limit(Limit::MaxVertexAttribs, 6);
    let target = FakeGl::new(&smaller);
    let (_, report) = restore(&snapshot, &target, &Options::default());
    let downgrades: Vec<_> = report.of_kind(EventKind::Downgraded).collect();
    assert_eq!(downgrades.len(), 1);
    assert_eq!(downgrades[0].namespace, None);
    assert_eq!(report.of_kind(EventKind::Failed).count(), 0);

    assert_eq!(
        target.get_vertex_attrib_fv(1, gl::CURRENT_VERTEX_ATTRIB),
        [0.5, 0.25, 0.125, 1.0]
    );
    assert_eq!(
        target.get_vertex_attrib_fv(5, gl::CURRENT_VERTEX_ATTRIB),
        [0.0, 0.0, 0.0, 1.0]
    );
    assert_eq!(target.get_error(), gl::NO_ERROR);
}

#[test]
fn pipelines_and_uniforms_survive_restore() {
    init_logging();
    let source = FakeGl::new(&info());
    let handles = populate(&source);
    let snapshot = capture(&source);

    let target = FakeGl::new(&info()).with_first_name(300);
    let (remapper, report) = restore(&snapshot, &target, &Options::default());
    assert!(report.is_clean(), "{}", report);

    let program = remapper.remap(Namespace::Programs, handles.program).unwrap();
    let stage_program = remapper.remap(Namespace::Programs, handles.stage_program).unwrap();
    let pipeline = remapper.remap(Namespace::Pipelines, handles.pipeline).unwrap();
    assert!(target.is_program_pipeline(pipeline));
    assert_eq!(target.get_program_pipeline_iv(pipeline, gl::FRAGMENT_SHADER) as GLuint, stage_program);
    assert_eq!(target.get_program_pipeline_iv(pipeline, gl::VERTEX_SHADER), 0);
    assert_eq!(target.get_program_pipeline_iv(pipeline, ACTIVE_PROGRAM) as GLuint, stage_program);
    // Restoring put the pipeline binding back.
    assert_eq!(target.get_integer_v(gl_snapshot::enums::PROGRAM_PIPELINE_BINDING), 0);

    let mut weights = [0.0];
    target.get_uniform_fv(program, target.get_uniform_location(program, "weights[1]"), &mut weights);
    assert_eq!(weights, [f32::INFINITY]);
    let mut image = [0];
    target.get_uniform_iv(program, target.get_uniform_location(program, "image"), &mut image);
    assert_eq!(image, [2]);
    let mut mode = [0];
    target.get_uniform_uiv(stage_program, target.get_uniform_location(stage_program, "mode"), &mut mode);
    assert_eq!(mode, [7]);
    let block = target.get_uniform_block_index(program, "Lights");
    assert_eq!(target.get_active_uniform_block_iv(program, block, gl::UNIFORM_BLOCK_BINDING), 3);
    assert_eq!(target.live_objects(Namespace::Syncs).len(), 1);
    assert_eq!(target.get_error(), gl::NO_ERROR);

    // Pipelines name their programs, so they can't come first.
    let mut remapper = HandleRemapper::new();
    let order = [Namespace::Pipelines, Namespace::Programs];
    let result = snapshot.restore_in_order(&FakeGl::new(&info()), &info(), &mut remapper, &Options::default(), &order);
    assert!(matches!(
        result,
        Err(PassError::DependencyOrder(RemapError::NotDeclared { namespace: Namespace::Programs, .. }))
    ));
}
