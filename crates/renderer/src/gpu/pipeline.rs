use super::uniforms::UniformLayout;

/// Layout objects shared by every program: one uniform buffer at set 0,
/// binding 0, visible to the fragment stage.
pub(crate) struct SharedLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl SharedLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("workshop uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("workshop pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        Self {
            uniform_layout,
            pipeline_layout,
        }
    }
}

/// A linked program: pipeline plus the uniform buffer its block lives in.
#[derive(Clone)]
pub struct GpuProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) layout: UniformLayout,
}

/// Creates the render pipeline for a vertex/fragment module pair. Validation
/// failures are collected through an error scope and returned as text.
pub(crate) fn link(
    device: &wgpu::Device,
    layouts: &SharedLayouts,
    format: wgpu::TextureFormat,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    uniforms: &UniformLayout,
) -> Result<GpuProgram, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("workshop pipeline"),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(err.to_string());
    }

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("workshop uniforms"),
        size: uniforms.size(),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("workshop uniform bind group"),
        layout: &layouts.uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    });

    Ok(GpuProgram {
        pipeline,
        buffer,
        bind_group,
        layout: uniforms.clone(),
    })
}

/// Records the full-screen draw of `program` into `view`.
pub(crate) fn encode_draw(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    program: &GpuProgram,
    load: wgpu::LoadOp<wgpu::Color>,
) {
    let mut pass = begin_pass(encoder, view, load, "workshop draw pass");
    pass.set_pipeline(&program.pipeline);
    pass.set_bind_group(0, &program.bind_group, &[]);
    pass.draw(0..3, 0..1);
}

/// Clears `view` to black without drawing.
pub(crate) fn encode_clear(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    begin_pass(
        encoder,
        view,
        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        "workshop clear pass",
    );
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
    label: &'static str,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}
