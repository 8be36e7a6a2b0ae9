use std::sync::Arc;

use smallvec::SmallVec;
use vkcookbook::{
    PipelineError,
    ash::vk,
    context::Device,
    resources::{GraphicsPipeline, PipelineCache, PipelineLayout, RenderPass, ShaderStage},
};

///Collects all fixed function state of a graphics pipeline. Each field maps to one of Vulkan's `Pipeline*StateCreateInfo`
/// structures. All fields are public and can be changed through [with](GraphicsPipelineState::with), or through the
/// specialised helper functions.
///
/// The default state renders filled, back-face culled triangle lists without depth testing or blending.
#[derive(Clone)]
pub struct GraphicsPipelineState {
    pub stages: Vec<ShaderStage>,

    pub vertex_bindings: SmallVec<[vk::VertexInputBindingDescription; 4]>,
    pub vertex_attributes: SmallVec<[vk::VertexInputAttributeDescription; 8]>,

    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    ///Control points per patch. Tessellation state is only set if this is `Some`.
    pub patch_control_points: Option<u32>,

    pub viewports: SmallVec<[vk::Viewport; 1]>,
    pub scissors: SmallVec<[vk::Rect2D; 1]>,

    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    ///(constant factor, clamp, slope factor)
    pub depth_bias: Option<(f32, f32, f32)>,
    pub line_width: f32,

    pub samples: vk::SampleCountFlags,
    ///Minimum fraction of sample shading. Sample shading is disabled if `None`.
    pub sample_shading: Option<f32>,
    pub alpha_to_coverage: bool,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    ///Front and back stencil operations. Stencil testing is disabled if `None`.
    pub stencil: Option<(vk::StencilOpState, vk::StencilOpState)>,

    pub logic_op: Option<vk::LogicOp>,
    ///One blend state per color attachment of the subpass.
    pub blend_attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; 4]>,
    pub blend_constants: [f32; 4],

    pub dynamic_states: SmallVec<[vk::DynamicState; 4]>,
}

impl Default for GraphicsPipelineState {
    fn default() -> Self {
        GraphicsPipelineState {
            stages: Vec::new(),
            vertex_bindings: SmallVec::new(),
            vertex_attributes: SmallVec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: None,
            viewports: SmallVec::new(),
            scissors: SmallVec::new(),
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: None,
            alpha_to_coverage: false,
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            stencil: None,
            logic_op: None,
            blend_attachments: SmallVec::new(),
            blend_constants: [0.0; 4],
            dynamic_states: SmallVec::new(),
        }
    }
}

///Blend state that writes all color channels without blending.
pub fn no_blending() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

///Classic `src * alpha + dst * (1 - alpha)` blending.
pub fn alpha_blending() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

impl GraphicsPipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    ///enables you to chain multiple assignments. For instance
    ///
    ///```ignore
    /// state.with(|s| s.cull_mode = vk::CullModeFlags::NONE)
    ///    .with(|s| s.line_width = 2.0)
    ///```
    pub fn with(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }

    pub fn with_stage(mut self, stage: ShaderStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_vertex_binding(
        mut self,
        binding: u32,
        stride: u32,
        input_rate: vk::VertexInputRate,
    ) -> Self {
        self.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate,
        });
        self
    }

    pub fn with_vertex_attribute(
        mut self,
        location: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> Self {
        self.vertex_attributes
            .push(vk::VertexInputAttributeDescription {
                location,
                binding,
                format,
                offset,
            });
        self
    }

    pub fn with_topology(mut self, topology: vk::PrimitiveTopology, primitive_restart: bool) -> Self {
        self.topology = topology;
        self.primitive_restart = primitive_restart;
        self
    }

    ///Adds a viewport and a matching scissor rectangle that cover `extent`.
    pub fn with_viewport(mut self, extent: vk::Extent2D) -> Self {
        self.viewports.push(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.scissors.push(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        self
    }

    ///Viewport and scissor are set while recording.
    pub fn with_dynamic_viewport_scissor(self) -> Self {
        self.with_dynamic_state(vk::DynamicState::VIEWPORT)
            .with_dynamic_state(vk::DynamicState::SCISSOR)
    }

    pub fn with_dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    pub fn with_rasterization(
        mut self,
        polygon_mode: vk::PolygonMode,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.polygon_mode = polygon_mode;
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_blend_attachment(mut self, state: vk::PipelineColorBlendAttachmentState) -> Self {
        self.blend_attachments.push(state);
        self
    }

    ///Sets `count` attachments that write all channels without blending.
    pub fn with_no_blending(mut self, count: usize) -> Self {
        self.blend_attachments = (0..count).map(|_| no_blending()).collect();
        self
    }

    fn is_dynamic(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }

    ///Number of viewports (and scissors) the pipeline is created with. If viewport or scissor state is dynamic this is
    /// the bigger of both counts, but at least 1. Otherwise it is the number of viewports.
    pub fn viewport_count(&self) -> u32 {
        if self.is_dynamic(vk::DynamicState::VIEWPORT) || self.is_dynamic(vk::DynamicState::SCISSOR)
        {
            self.viewports.len().max(self.scissors.len()).max(1) as u32
        } else {
            self.viewports.len() as u32
        }
    }

    //Static scissors, one per viewport. Viewports without a scissor get one that covers the viewport.
    fn static_scissors(&self) -> SmallVec<[vk::Rect2D; 1]> {
        (0..self.viewport_count() as usize)
            .map(|idx| {
                if let Some(scissor) = self.scissors.get(idx) {
                    return *scissor;
                }
                match self.viewports.get(idx) {
                    Some(vp) => vk::Rect2D {
                        offset: vk::Offset2D {
                            x: vp.x as i32,
                            y: vp.y as i32,
                        },
                        extent: vk::Extent2D {
                            width: vp.width as u32,
                            height: vp.height as u32,
                        },
                    },
                    None => vk::Rect2D::default(),
                }
            })
            .collect()
    }

    ///Creates the pipeline for `subpass` of `render_pass`.
    pub fn build(
        &self,
        device: &Arc<Device>,
        layout: &Arc<PipelineLayout>,
        render_pass: &Arc<RenderPass>,
        subpass: u32,
        cache: Option<&PipelineCache>,
    ) -> Result<GraphicsPipeline, PipelineError> {
        let stages = self
            .stages
            .iter()
            .map(|s| s.as_create_info(None))
            .collect::<Vec<_>>();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart);

        let tessellation = self.patch_control_points.map(|points| {
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(points)
        });

        let scissors = self.static_scissors();
        let count = self.viewport_count();
        let mut viewport_state =
            vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(count)
                .scissor_count(count);
        if !self.is_dynamic(vk::DynamicState::VIEWPORT) {
            viewport_state = viewport_state.viewports(&self.viewports);
        }
        if !self.is_dynamic(vk::DynamicState::SCISSOR) {
            viewport_state = viewport_state.scissors(&scissors);
        }

        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(self.depth_clamp)
            .rasterizer_discard_enable(self.rasterizer_discard)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(self.line_width);
        if let Some((constant, clamp, slope)) = self.depth_bias {
            rasterization = rasterization
                .depth_bias_enable(true)
                .depth_bias_constant_factor(constant)
                .depth_bias_clamp(clamp)
                .depth_bias_slope_factor(slope);
        }

        let mut multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .alpha_to_coverage_enable(self.alpha_to_coverage);
        if let Some(min) = self.sample_shading {
            multisample = multisample
                .sample_shading_enable(true)
                .min_sample_shading(min);
        }

        let mut depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        if let Some((front, back)) = self.stencil {
            depth_stencil = depth_stencil
                .stencil_test_enable(true)
                .front(front)
                .back(back);
        }

        let mut color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&self.blend_attachments)
            .blend_constants(self.blend_constants);
        if let Some(op) = self.logic_op {
            color_blend = color_blend.logic_op_enable(true).logic_op(op);
        }

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend);
        if let Some(tessellation) = &tessellation {
            create_info = create_info.tessellation_state(tessellation);
        }
        if !self.dynamic_states.is_empty() {
            create_info = create_info.dynamic_state(&dynamic_state);
        }

        GraphicsPipeline::new(
            device,
            create_info,
            layout.clone(),
            render_pass.clone(),
            subpass,
            cache,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 640,
        height: 480,
    };

    #[test]
    fn static_viewport_count() {
        let state = GraphicsPipelineState::new();
        assert_eq!(state.viewport_count(), 0);

        let state = state.with_viewport(EXTENT).with_viewport(EXTENT);
        assert_eq!(state.viewport_count(), 2);
    }

    #[test]
    fn dynamic_viewport_count_is_max() {
        let state = GraphicsPipelineState::new().with_dynamic_viewport_scissor();
        assert_eq!(state.viewport_count(), 1);

        let state = state.with(|s| {
            s.scissors.push(vk::Rect2D::default());
            s.scissors.push(vk::Rect2D::default());
            s.scissors.push(vk::Rect2D::default());
        });
        assert_eq!(state.viewport_count(), 3);

        //only dynamic scissors
        let state = GraphicsPipelineState::new()
            .with_viewport(EXTENT)
            .with_viewport(EXTENT)
            .with_dynamic_state(vk::DynamicState::SCISSOR);
        assert_eq!(state.viewport_count(), 2);
    }

    #[test]
    fn missing_scissors_cover_viewport() {
        let state = GraphicsPipelineState::new()
            .with_viewport(EXTENT)
            .with(|s| {
                s.viewports.push(vk::Viewport {
                    x: 10.0,
                    y: 20.0,
                    width: 30.0,
                    height: 40.0,
                    min_depth: 0.0,
                    max_depth: 1.0,
                })
            });
        let scissors = state.static_scissors();
        assert_eq!(scissors.len(), 2);
        assert_eq!(scissors[0].extent, EXTENT);
        assert_eq!(scissors[1].offset, vk::Offset2D { x: 10, y: 20 });
        assert_eq!(
            scissors[1].extent,
            vk::Extent2D {
                width: 30,
                height: 40
            }
        );
    }

    #[test]
    fn dynamic_states_are_unique() {
        let state = GraphicsPipelineState::new()
            .with_dynamic_viewport_scissor()
            .with_dynamic_state(vk::DynamicState::VIEWPORT);
        assert_eq!(state.dynamic_states.len(), 2);
    }

    #[test]
    fn blending_presets() {
        let state = GraphicsPipelineState::new()
            .with_no_blending(2)
            .with_blend_attachment(alpha_blending());
        assert_eq!(state.blend_attachments.len(), 3);
        assert_eq!(state.blend_attachments[0].blend_enable, vk::FALSE);
        assert_eq!(state.blend_attachments[2].blend_enable, vk::TRUE);
    }
}
