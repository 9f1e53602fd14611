// SPDX-License-Identifier: CEPL-1.0
//! The render context: builds the whole Vulkan stack in dependency order,
//! drives frames through [`FrameOps`] and releases everything in reverse.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use ash::{
    khr::{surface, swapchain},
    vk, Entry, Instance,
};
use miner_render::{Mvp, RenderSize, Renderer, Vertex};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, trace};

use crate::adapter::{select_physical_device, AdapterCandidate, AdapterQuery, SurfaceAdapters};
use crate::buffer::{GpuBuffer, HOST_VISIBLE_COHERENT};
use crate::descriptor::UniformBinding;
use crate::device::{create_logical_device, LogicalDevice};
use crate::error::{RenderResult, VkCheck};
use crate::frame::{FrameLoop, FrameOps, FramePayload, FrameState};
use crate::instance::{create_instance, DebugMessenger};
use crate::pipeline::{scissor, PipelineConfig, PipelineState, Winding};
use crate::shader::{ShaderLoader, SpvDirLoader};
use crate::swapchain::{create_render_pass, ChainPlan, PresentationChain};

pub const DEFAULT_BUFFER_CAPACITY: vk::DeviceSize = 10 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderSource {
    Dir(PathBuf),
    #[cfg(feature = "embedded-shaders")]
    Embedded,
}

impl ShaderSource {
    pub fn loader(&self) -> Box<dyn ShaderLoader> {
        match self {
            ShaderSource::Dir(dir) => Box::new(SpvDirLoader::new(dir.clone())),
            #[cfg(feature = "embedded-shaders")]
            ShaderSource::Embedded => Box::new(crate::shader::EmbeddedShaders),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Enables the Khronos validation layer and routes its output to tracing.
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub winding: Winding,
    pub blend: bool,
    pub shaders: ShaderSource,
    pub vertex_capacity: vk::DeviceSize,
    pub index_capacity: vk::DeviceSize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            winding: Winding::Clockwise,
            blend: true,
            shaders: ShaderSource::Dir(PathBuf::from("Shaders")),
            vertex_capacity: DEFAULT_BUFFER_CAPACITY,
            index_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
}

impl FrameSync {
    unsafe fn create(device: &ash::Device) -> RenderResult<Self> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        Ok(Self {
            image_available: device
                .create_semaphore(&ci, None)
                .check("vkCreateSemaphore")?,
            render_finished: device
                .create_semaphore(&ci, None)
                .check("vkCreateSemaphore")?,
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_available, None);
    }
}

pub struct Context {
    // Keeps the loader library alive for as long as the instance.
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    adapter: AdapterCandidate,
    device: LogicalDevice,
    swapchain_loader: swapchain::Device,
    render_pass: vk::RenderPass,
    chain: PresentationChain,
    pipeline: PipelineState,
    command_pool: vk::CommandPool,
    sync: FrameSync,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uniform_buffer: GpuBuffer,
    uniforms: UniformBinding,
    frame: FrameLoop,
    payload: FramePayload,
    clear_color: [f32; 4],
}

impl Context {
    pub fn adapter_name(&self) -> &str {
        &self.adapter.name
    }

    pub fn extent(&self) -> RenderSize {
        RenderSize {
            width: self.chain.extent.width,
            height: self.chain.extent.height,
        }
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame.frames()
    }
}

// CREATION ORDER (each step depends on the ones before it):
// instance -> surface -> debug messenger -> adapter -> device + queues
// -> render pass -> swapchain images/views/framebuffers -> pipeline
// -> command pool -> semaphores -> buffers -> descriptor set
unsafe fn build_context(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    config: ContextConfig,
) -> Result<Context> {
    let display_raw = display.display_handle()?.as_raw();
    let window_raw = window.window_handle()?.as_raw();

    let entry = Entry::load().context("loading the Vulkan library")?;
    let instance = create_instance(&entry, display_raw, config.validation)
        .context("creating the Vulkan instance")?;
    let surface_loader = surface::Instance::new(&entry, &instance);
    let surface = ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
        .check("vkCreateSurfaceKHR")?;
    let debug = if config.validation {
        Some(DebugMessenger::new(&entry, &instance)?)
    } else {
        None
    };

    let query = SurfaceAdapters {
        instance: &instance,
        surface_loader: &surface_loader,
        surface,
    };
    let adapter = select_physical_device(&query).context("selecting a GPU")?;
    let support = query.surface_support(adapter.adapter)?;
    let device = create_logical_device(&instance, &adapter, config.validation)
        .context("creating the logical device")?;
    let swapchain_loader = swapchain::Device::new(&instance, &device.device);

    let plan = ChainPlan::new(&support, &adapter.queue_families, size);
    let render_pass = create_render_pass(&device.device, plan.format.format)?;
    let chain = PresentationChain::create(
        &device.device,
        &swapchain_loader,
        surface,
        &plan,
        render_pass,
    )
    .context("creating the presentation chain")?;

    let pipeline_cfg = PipelineConfig {
        extent: chain.extent,
        winding: config.winding,
        blend: config.blend,
    };
    let shaders = config.shaders.loader();
    let pipeline = PipelineState::create(&device.device, render_pass, &pipeline_cfg, shaders.as_ref())
        .context("building the graphics pipeline")?;

    let pool_ci = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: device.graphics_family,
        ..Default::default()
    };
    let command_pool = device
        .device
        .create_command_pool(&pool_ci, None)
        .check("vkCreateCommandPool")?;
    let sync = FrameSync::create(&device.device)?;

    let memory_props = instance.get_physical_device_memory_properties(adapter.adapter);
    let vertex_buffer = GpuBuffer::create(
        &device.device,
        &memory_props,
        config.vertex_capacity,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        HOST_VISIBLE_COHERENT,
    )
    .context("vertex buffer")?;
    let index_buffer = GpuBuffer::create(
        &device.device,
        &memory_props,
        config.index_capacity,
        vk::BufferUsageFlags::INDEX_BUFFER,
        HOST_VISIBLE_COHERENT,
    )
    .context("index buffer")?;
    let uniform_size = std::mem::size_of::<Mvp>() as vk::DeviceSize;
    let uniform_buffer = GpuBuffer::create(
        &device.device,
        &memory_props,
        uniform_size,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        HOST_VISIBLE_COHERENT,
    )
    .context("uniform buffer")?;
    let uniforms = UniformBinding::create(
        &device.device,
        pipeline.set_layout,
        uniform_buffer.buffer,
        uniform_size,
    )?;
    info!(
        vertex_bytes = config.vertex_capacity,
        index_bytes = config.index_capacity,
        uniform_bytes = uniform_size,
        "buffers mapped"
    );

    Ok(Context {
        _entry: entry,
        instance,
        debug,
        surface_loader,
        surface,
        adapter,
        device,
        swapchain_loader,
        render_pass,
        chain,
        pipeline,
        command_pool,
        sync,
        vertex_buffer,
        index_buffer,
        uniform_buffer,
        uniforms,
        frame: FrameLoop::default(),
        payload: FramePayload::default(),
        clear_color: config.clear_color,
    })
}

impl FrameOps for Context {
    type Commands = vk::CommandBuffer;

    fn wait_present_idle(&mut self) -> RenderResult<()> {
        unsafe {
            self.device
                .device
                .queue_wait_idle(self.device.present_queue)
        }
        .check("vkQueueWaitIdle")
    }

    fn acquire_image(&mut self) -> RenderResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                u64::MAX,
                self.sync.image_available,
                vk::Fence::null(),
            )
        }
        .check("vkAcquireNextImageKHR")?;
        if suboptimal {
            trace!(index, "acquired a suboptimal image");
        }
        Ok(index)
    }

    fn begin_commands(&mut self) -> RenderResult<vk::CommandBuffer> {
        let alloc = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let buffers = unsafe { self.device.device.allocate_command_buffers(&alloc) }
            .check("vkAllocateCommandBuffers")?;
        buffers.first().copied().ok_or(crate::RenderError::Api {
            op: "vkAllocateCommandBuffers",
            result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        })
    }

    fn record_draw(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        payload: &FramePayload,
    ) -> RenderResult<()> {
        let d = &self.device.device;
        let framebuffer = self.chain.framebuffer(image_index)?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let pass_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass,
            framebuffer,
            render_area: scissor(self.chain.extent),
            clear_value_count: 1,
            p_clear_values: &clear,
            ..Default::default()
        };

        unsafe {
            d.begin_command_buffer(cmd, &begin)
                .check("vkBeginCommandBuffer")?;
            d.cmd_begin_render_pass(cmd, &pass_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.uniforms.set],
                &[],
            );
            d.cmd_push_constants(
                cmd,
                self.pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                payload.mvp.as_bytes(),
            );
            d.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            d.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            d.cmd_draw_indexed(cmd, payload.index_count, 1, 0, 0, 0);
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).check("vkEndCommandBuffer")
        }
    }

    fn submit(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &self.sync.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                std::slice::from_ref(&submit),
                vk::Fence::null(),
            )
        }
        .check("vkQueueSubmit")
    }

    fn present(&mut self, image_index: u32) -> RenderResult<()> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync.render_finished,
            swapchain_count: 1,
            p_swapchains: &self.chain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let suboptimal = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue, &present)
        }
        .check("vkQueuePresentKHR")?;
        if suboptimal {
            trace!(image_index, "presented to a suboptimal swapchain");
        }
        Ok(())
    }

    fn wait_device_idle(&mut self) -> RenderResult<()> {
        unsafe { self.device.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }

    fn free_commands(&mut self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device
                .device
                .free_command_buffers(self.command_pool, &[cmd]);
        }
    }
}

impl Renderer for Context {
    type Config = ContextConfig;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: ContextConfig,
    ) -> Result<Self> {
        let ctx = unsafe { build_context(window, display, size, config)? };
        info!(
            "Vulkan context ready on {} ({}x{})",
            ctx.adapter.name, ctx.chain.extent.width, ctx.chain.extent.height
        );
        Ok(ctx)
    }

    fn render(&mut self) -> Result<()> {
        let payload = self.payload;
        let mut frame = self.frame;
        let result = frame.run(&mut *self, &payload);
        self.frame = frame;
        Ok(result?)
    }

    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u16]) -> Result<()> {
        self.vertex_buffer
            .write(0, vertices)
            .context("writing vertices")?;
        self.index_buffer
            .write(0, indices)
            .context("writing indices")?;
        self.payload.index_count = indices.len() as u32;
        Ok(())
    }

    fn set_transform(&mut self, mvp: &Mvp) -> Result<()> {
        self.uniform_buffer
            .write(0, std::slice::from_ref(mvp))
            .context("writing the uniform block")?;
        self.payload.mvp = *mvp;
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }
}

// TEARDOWN ORDER (reverse of creation):
// - device_wait_idle() so nothing in flight references what follows
// - descriptor pool, buffers, semaphores, command pool
// - pipeline, then framebuffers/views/swapchain, then render pass
// - device, then debug messenger and surface; instance last
impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device.device;
            d.device_wait_idle().ok();

            self.uniforms.destroy(d);
            self.uniform_buffer.destroy(d);
            self.index_buffer.destroy(d);
            self.vertex_buffer.destroy(d);
            self.sync.destroy(d);
            d.destroy_command_pool(self.command_pool, None);

            self.pipeline.destroy(d);
            self.chain.destroy(d, &self.swapchain_loader);
            d.destroy_render_pass(self.render_pass, None);

            d.destroy_device(None);
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        info!("Vulkan context destroyed after {} frames", self.frame.frames());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_startup_values() {
        let cfg = ContextConfig::default();
        assert_eq!(cfg.vertex_capacity, 10240);
        assert_eq!(cfg.index_capacity, 10240);
        assert_eq!(cfg.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.winding, Winding::Clockwise);
        assert_eq!(cfg.shaders, ShaderSource::Dir(PathBuf::from("Shaders")));
        assert_eq!(cfg.validation, cfg!(debug_assertions));
    }

    #[test]
    fn directory_source_reports_missing_shaders() {
        let source = ShaderSource::Dir(PathBuf::from("/nonexistent/miner-shaders"));
        let err = source
            .loader()
            .load(crate::shader::ShaderStage::Vertex)
            .unwrap_err();
        assert!(err.to_string().contains("vert.spv"));
    }
}
