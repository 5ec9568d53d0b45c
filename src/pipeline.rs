use vulkanalia::prelude::v1_0::*;
use anyhow::Result;

pub fn shader_stage_info(
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
) -> vk::PipelineShaderStageCreateInfo {
    // All shader stages enter the pipeline the same way: the
    // stage bit, the module holding the bytecode, and the entry
    // point, conventionally "main".
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(stage)
        .module(module)
        .name(b"main\0")
        .build()
}

/// Creates an empty pipeline layout: no descriptor sets, no
/// push constants. Enough for pipelines whose only inputs are
/// hardcoded in the shaders.
pub fn create_pipeline_layout(device: &Device) -> Result<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo::builder();
    Ok(unsafe { device.create_pipeline_layout(&info, None)? })
}

/// Piecewise construction for graphics pipelines.
///
/// A graphics pipeline info struct wants a dozen sub-structs
/// filled in even when most of them carry defaults; the builder
/// keeps the interesting state (shaders, topology, raster mode,
/// blending, formats) settable one piece at a time and
/// assembles the rest on [`build`](PipelineBuilder::build).
/// Pipelines target dynamic rendering, so instead of a render
/// pass the builder records the attachment formats the pipeline
/// will draw into.
pub struct PipelineBuilder {
    shader_stages: Vec<vk::PipelineShaderStageCreateInfo>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo,
    rasterizer: vk::PipelineRasterizationStateCreateInfo,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    multisampling: vk::PipelineMultisampleStateCreateInfo,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo,
    color_attachment_format: vk::Format,
    depth_attachment_format: vk::Format,
    layout: vk::PipelineLayout,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            shader_stages: Vec::new(),
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default(),
            rasterizer: vk::PipelineRasterizationStateCreateInfo::default(),
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default(),
            multisampling: vk::PipelineMultisampleStateCreateInfo::default(),
            depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default(),
            color_attachment_format: vk::Format::UNDEFINED,
            depth_attachment_format: vk::Format::UNDEFINED,
            layout: vk::PipelineLayout::null(),
        }
    }

    /// Resets every piece of state back to its default.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// One vertex and one fragment shader; replaces whatever
    /// stages were set before.
    pub fn set_shaders(&mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) {
        self.shader_stages.clear();
        self.shader_stages.push(shader_stage_info(vk::ShaderStageFlags::VERTEX, vertex));
        self.shader_stages.push(shader_stage_info(vk::ShaderStageFlags::FRAGMENT, fragment));
    }

    pub fn set_input_topology(&mut self, topology: vk::PrimitiveTopology) {
        // Primitive restart (breaking up strips with a special
        // index) stays off; nothing draws strips yet.
        self.input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(topology)
            .primitive_restart_enable(false)
            .build();
    }

    pub fn set_polygon_mode(&mut self, polygon_mode: vk::PolygonMode) {
        self.rasterizer.polygon_mode = polygon_mode;
        self.rasterizer.line_width = 1.0;
    }

    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) {
        self.rasterizer.cull_mode = cull_mode;
        self.rasterizer.front_face = front_face;
    }

    /// One sample per pixel, no sample shading: multisampling
    /// disabled.
    pub fn set_multisampling_none(&mut self) {
        self.multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
            .build();
    }

    /// No blending: the fragment shader's output overwrites the
    /// attachment, all channels written.
    pub fn disable_blending(&mut self) {
        self.color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(false)
            .build();
    }

    /// No depth testing or writing at all.
    pub fn disable_depthtest(&mut self) {
        self.depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_compare_op(vk::CompareOp::NEVER)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .build();
    }

    pub fn set_color_attachment_format(&mut self, format: vk::Format) {
        self.color_attachment_format = format;
    }

    pub fn set_depth_format(&mut self, format: vk::Format) {
        self.depth_attachment_format = format;
    }

    pub fn set_layout(&mut self, layout: vk::PipelineLayout) {
        self.layout = layout;
    }

    pub fn build(&self, device: &Device) -> Result<vk::Pipeline> {
        // A single viewport and scissor, with the actual
        // rectangles supplied at draw time through dynamic
        // state.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let attachments = &[self.color_blend_attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments);

        // No vertex input state: vertex data, when it arrives,
        // will be pulled from buffers in the vertex shader.
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder();

        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(dynamic_states);

        // Dynamic rendering: the attachment formats that would
        // otherwise live in a render pass are chained onto the
        // pipeline info instead.
        let color_attachment_formats = &[self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(color_attachment_formats)
            .depth_attachment_format(self.depth_attachment_format);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&self.shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterizer)
            .multisample_state(&self.multisampling)
            .color_blend_state(&color_blend_state)
            .depth_stencil_state(&self.depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info);

        let pipeline = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)?.0[0]
        };

        Ok(pipeline)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_is_set_without_primitive_restart() {
        let mut builder = PipelineBuilder::new();
        builder.set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        assert_eq!(builder.input_assembly.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.input_assembly.primitive_restart_enable, vk::FALSE);
    }

    #[test]
    fn disabled_blending_still_writes_all_channels() {
        let mut builder = PipelineBuilder::new();
        builder.disable_blending();

        assert_eq!(builder.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(
            builder.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::all(),
        );
    }

    #[test]
    fn no_multisampling_means_one_sample() {
        let mut builder = PipelineBuilder::new();
        builder.set_multisampling_none();

        assert_eq!(
            builder.multisampling.rasterization_samples,
            vk::SampleCountFlags::_1,
        );
        assert_eq!(builder.multisampling.sample_shading_enable, vk::FALSE);
    }

    #[test]
    fn clear_resets_shader_stages_and_formats() {
        let mut builder = PipelineBuilder::new();
        builder.set_shaders(vk::ShaderModule::null(), vk::ShaderModule::null());
        builder.set_color_attachment_format(vk::Format::B8G8R8A8_SRGB);

        builder.clear();

        assert!(builder.shader_stages.is_empty());
        assert_eq!(builder.color_attachment_format, vk::Format::UNDEFINED);
    }

    #[test]
    fn shader_stages_come_in_vertex_fragment_order() {
        let mut builder = PipelineBuilder::new();
        builder.set_shaders(vk::ShaderModule::null(), vk::ShaderModule::null());
        builder.set_shaders(vk::ShaderModule::null(), vk::ShaderModule::null());

        // Setting shaders twice replaces, never accumulates.
        assert_eq!(builder.shader_stages.len(), 2);
        assert_eq!(builder.shader_stages[0].stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(builder.shader_stages[1].stage, vk::ShaderStageFlags::FRAGMENT);
    }
}
