use std::{
    ffi::CStr,
    mem::ManuallyDrop,
    sync::{Arc, Mutex},
};

use ahash::AHashMap;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator, AllocatorCreateDesc};
use smallvec::SmallVec;

use super::{lock, Device, Queue};
use crate::{
    allocator::{allocate_for, MemoryUsage},
    command::Command,
    error::DeviceError,
    resources::{
        Attachment, AttachmentUsage, BufDesc, ImgDesc, PipelineConfig, RenderTarget, ShaderSource,
    },
};

const APP_NAME: &CStr = c"frameline";

#[derive(Default)]
struct Objects {
    buffers: AHashMap<vk::Buffer, Allocation>,
    images: AHashMap<vk::Image, Allocation>,
    pipelines: AHashMap<vk::Pipeline, vk::PipelineLayout>,
    render_targets: AHashMap<vk::Framebuffer, (vk::RenderPass, SmallVec<[vk::ImageView; 4]>)>,
}

///[Device] backed by Vulkan 1.3 with `synchronization2`. Owns instance, device and a `gpu-allocator` instance, all of which
/// are destroyed when the last reference is dropped.
pub struct VulkanDevice {
    pub inner: ash::Device,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    //keeps the loaded library alive
    _entry: Option<ash::Entry>,
    queue: Mutex<Queue>,
    command_pool: Mutex<vk::CommandPool>,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    objects: Mutex<Objects>,
    name: String,
}

impl VulkanDevice {
    ///Loads Vulkan and creates a device without any surface support on the first GPU that has a graphics queue and supports Vulkan 1.3.
    pub fn new_headless() -> Result<Arc<Self>, DeviceError> {
        let entry = unsafe { ash::Entry::load()? };

        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .engine_name(APP_NAME)
            .api_version(vk::API_VERSION_1_3);
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let selected = unsafe { instance.enumerate_physical_devices() }
            .map_err(DeviceError::from)
            .and_then(|devices| {
                devices
                    .into_iter()
                    .filter(|pd| {
                        let props = unsafe { instance.get_physical_device_properties(*pd) };
                        props.api_version >= vk::API_VERSION_1_3
                    })
                    .find_map(|pd| Queue::find_graphics_family(&instance, pd).map(|q| (pd, q)))
                    .ok_or(DeviceError::NoPhysicalDevice)
            });

        let (physical_device, (family_index, properties)) = match selected {
            Ok(sel) => sel,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family_index)
            .queue_priorities(&priorities)];
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .push_next(&mut features13);

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) } {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e.into());
            }
        };

        let queue = Queue {
            inner: unsafe { device.get_device_queue(family_index, 0) },
            family_index,
            properties,
        };

        match unsafe { Self::from_raw(instance.clone(), physical_device, device.clone(), queue) } {
            Ok(mut created) => {
                created._entry = Some(entry);
                Ok(Arc::new(created))
            }
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                Err(e)
            }
        }
    }

    ///Wraps an existing device.
    ///
    /// # Safety
    ///
    /// `device` must have been created from `instance` and `physical_device` with `synchronization2` enabled and `queue` must be
    /// a graphics queue of `device`. The returned object takes ownership of both, `instance` and `device`, and destroys them when
    /// dropped. If an error is returned, neither was destroyed.
    pub unsafe fn from_raw(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue: Queue,
    ) -> Result<Self, DeviceError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| DeviceError::Allocation(e.to_string()))?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = device.create_command_pool(&pool_info, None)?;

        let props = instance.get_physical_device_properties(physical_device);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unnamed vulkan device".to_owned());

        #[cfg(feature = "logging")]
        log::info!(
            "Created Vulkan device {} using queue family {}",
            name,
            queue.family_index
        );

        Ok(VulkanDevice {
            inner: device,
            instance,
            physical_device,
            _entry: None,
            queue: Mutex::new(queue),
            command_pool: Mutex::new(command_pool),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            objects: Mutex::new(Objects::default()),
            name,
        })
    }

    pub fn queue_family_index(&self) -> u32 {
        lock(&self.queue).family_index
    }

    fn free_allocation(&self, allocation: Allocation) {
        if let Err(_e) = lock(&self.allocator).free(allocation) {
            #[cfg(feature = "logging")]
            log::error!("Failed to free allocation: {}", _e);
        }
    }

    fn create_shader_module(&self, source: &ShaderSource) -> Result<vk::ShaderModule, DeviceError> {
        let code = match source {
            ShaderSource::Path(path) => {
                let mut file = std::fs::File::open(path)?;
                ash::util::read_spv(&mut file)?
            }
            ShaderSource::SpirV(code) => code.clone(),
        };
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        Ok(unsafe { self.inner.create_shader_module(&info, None)? })
    }

    fn create_render_pass(&self, attachments: &[Attachment]) -> Result<vk::RenderPass, DeviceError> {
        let descriptions: SmallVec<[vk::AttachmentDescription; 4]> = attachments
            .iter()
            .map(|att| {
                vk::AttachmentDescription::default()
                    .format(att.desc.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(att.desc.on_load.to_vk())
                    .store_op(att.desc.on_store.to_vk())
                    .stencil_load_op(att.desc.on_load.to_vk())
                    .stencil_store_op(att.desc.on_store.to_vk())
                    .initial_layout(att.desc.initial_layout())
                    .final_layout(att.desc.final_layout())
            })
            .collect();

        //color references are indexed by shader location, gaps are unused
        let mut color_refs: SmallVec<[vk::AttachmentReference; 4]> = SmallVec::new();
        let mut depth_ref = None;
        for (idx, att) in attachments.iter().enumerate() {
            match att.desc.usage {
                AttachmentUsage::Color(location) => {
                    let location = location as usize;
                    if color_refs.len() <= location {
                        color_refs.resize(
                            location + 1,
                            vk::AttachmentReference {
                                attachment: vk::ATTACHMENT_UNUSED,
                                layout: vk::ImageLayout::UNDEFINED,
                            },
                        );
                    }
                    color_refs[location] = vk::AttachmentReference {
                        attachment: idx as u32,
                        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    };
                }
                AttachmentUsage::DepthStencil => {
                    depth_ref = Some(vk::AttachmentReference {
                        attachment: idx as u32,
                        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    })
                }
            }
        }

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth);
        }

        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(attachment_stages | vk::PipelineStageFlags::TRANSFER)
                .src_access_mask(attachment_access | vk::AccessFlags::TRANSFER_READ)
                .dst_stage_mask(attachment_stages)
                .dst_access_mask(attachment_access),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(attachment_stages)
                .src_access_mask(attachment_access)
                .dst_stage_mask(vk::PipelineStageFlags::TRANSFER)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ),
        ];

        let subpasses = [subpass];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        Ok(unsafe { self.inner.create_render_pass(&info, None)? })
    }

    fn record(&self, cb: vk::CommandBuffer, command: &Command) {
        let dev = &self.inner;
        unsafe {
            match command {
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    width,
                    height,
                    clear_values,
                } => {
                    let clears: SmallVec<[vk::ClearValue; 4]> =
                        clear_values.iter().map(|c| c.to_vk()).collect();
                    let info = vk::RenderPassBeginInfo::default()
                        .render_pass(*render_pass)
                        .framebuffer(*framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent: vk::Extent2D {
                                width: *width,
                                height: *height,
                            },
                        })
                        .clear_values(&clears);
                    dev.cmd_begin_render_pass(cb, &info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => dev.cmd_end_render_pass(cb),
                Command::BindPipeline { pipeline } => {
                    dev.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, *pipeline)
                }
                Command::BindVertexBuffer {
                    binding,
                    buffer,
                    offset,
                } => dev.cmd_bind_vertex_buffers(cb, *binding, &[*buffer], &[*offset]),
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => dev.cmd_bind_index_buffer(cb, *buffer, *offset, *index_type),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => dev.cmd_draw_indexed(
                    cb,
                    *index_count,
                    *instance_count,
                    *first_index,
                    *vertex_offset,
                    *first_instance,
                ),
                Command::PipelineBarrier { buffers, images } => {
                    let buffers: SmallVec<[vk::BufferMemoryBarrier2; 2]> =
                        buffers.iter().map(|b| b.to_vk()).collect();
                    let images: SmallVec<[vk::ImageMemoryBarrier2; 2]> =
                        images.iter().map(|i| i.to_vk()).collect();
                    let info = vk::DependencyInfo::default()
                        .buffer_memory_barriers(&buffers)
                        .image_memory_barriers(&images);
                    dev.cmd_pipeline_barrier2(cb, &info);
                }
                Command::CopyBuffer { src, dst, region } => dev.cmd_copy_buffer(
                    cb,
                    *src,
                    *dst,
                    &[vk::BufferCopy {
                        src_offset: region.src_offset,
                        dst_offset: region.dst_offset,
                        size: region.size,
                    }],
                ),
                Command::CopyImage { src, dst } => {
                    let region = vk::ImageCopy::default()
                        .src_subresource(src.subresource_layers())
                        .dst_subresource(dst.subresource_layers())
                        .extent(vk::Extent3D {
                            width: src.width.min(dst.width),
                            height: src.height.min(dst.height),
                            depth: 1,
                        });
                    dev.cmd_copy_image(
                        cb,
                        src.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Command::BlitImage { src, dst, filter } => {
                    let region = vk::ImageBlit::default()
                        .src_subresource(src.subresource_layers())
                        .src_offsets(src.blit_offsets())
                        .dst_subresource(dst.subresource_layers())
                        .dst_offsets(dst.blit_offsets());
                    dev.cmd_blit_image(
                        cb,
                        src.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                        *filter,
                    );
                }
            }
        }
    }
}

impl Device for VulkanDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_buffer(
        &self,
        desc: &BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<vk::Buffer, DeviceError> {
        let info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.inner.create_buffer(&info, None)? };
        let requirements = unsafe { self.inner.get_buffer_memory_requirements(buffer) };

        let allocation =
            match allocate_for(&mut lock(&self.allocator), name, requirements, usage, true) {
                Ok(a) => a,
                Err(e) => {
                    unsafe { self.inner.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        if let Err(e) = unsafe {
            self.inner
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.inner.destroy_buffer(buffer, None) };
            self.free_allocation(allocation);
            return Err(e.into());
        }

        lock(&self.objects).buffers.insert(buffer, allocation);
        Ok(buffer)
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        use ash::vk::Handle;

        let mut objects = lock(&self.objects);
        let allocation = objects
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(buffer.as_raw()))?;
        let size = allocation.size();
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or(DeviceError::NotMapable)?;

        let start = offset as usize;
        let end = start + data.len();
        if end > mapped.len() {
            return Err(DeviceError::OutOfBounds {
                offset,
                requested: data.len() as u64,
                size,
            });
        }
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let allocation = lock(&self.objects).buffers.remove(&buffer);
        unsafe { self.inner.destroy_buffer(buffer, None) };
        if let Some(allocation) = allocation {
            self.free_allocation(allocation);
        }
    }

    fn create_image(&self, desc: &ImgDesc, name: Option<&str>) -> Result<vk::Image, DeviceError> {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.inner.create_image(&info, None)? };
        let requirements = unsafe { self.inner.get_image_memory_requirements(image) };

        let allocation = match allocate_for(
            &mut lock(&self.allocator),
            name,
            requirements,
            MemoryUsage::GpuOnly,
            false,
        ) {
            Ok(a) => a,
            Err(e) => {
                unsafe { self.inner.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.inner
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            unsafe { self.inner.destroy_image(image, None) };
            self.free_allocation(allocation);
            return Err(e.into());
        }

        lock(&self.objects).images.insert(image, allocation);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let allocation = lock(&self.objects).images.remove(&image);
        unsafe { self.inner.destroy_image(image, None) };
        if let Some(allocation) = allocation {
            self.free_allocation(allocation);
        }
    }

    fn create_render_target(
        &self,
        attachments: &[Attachment],
        extent: vk::Extent2D,
    ) -> Result<RenderTarget, DeviceError> {
        let render_pass = self.create_render_pass(attachments)?;

        let mut views: SmallVec<[vk::ImageView; 4]> = SmallVec::new();
        let destroy_partial = |views: &[vk::ImageView]| unsafe {
            for view in views {
                self.inner.destroy_image_view(*view, None);
            }
            self.inner.destroy_render_pass(render_pass, None);
        };

        for att in attachments {
            let info = vk::ImageViewCreateInfo::default()
                .image(att.image.inner)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(att.desc.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(att.desc.aspect())
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            match unsafe { self.inner.create_image_view(&info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    destroy_partial(views.as_slice());
                    return Err(e.into());
                }
            }
        }

        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = match unsafe { self.inner.create_framebuffer(&info, None) } {
            Ok(fb) => fb,
            Err(e) => {
                destroy_partial(views.as_slice());
                return Err(e.into());
            }
        };

        lock(&self.objects)
            .render_targets
            .insert(framebuffer, (render_pass, views));
        Ok(RenderTarget {
            render_pass,
            framebuffer,
        })
    }

    fn destroy_render_target(&self, target: RenderTarget) {
        let entry = lock(&self.objects)
            .render_targets
            .remove(&target.framebuffer);
        unsafe {
            self.inner.destroy_framebuffer(target.framebuffer, None);
            if let Some((_, views)) = entry {
                for view in views {
                    self.inner.destroy_image_view(view, None);
                }
            }
            self.inner.destroy_render_pass(target.render_pass, None);
        }
    }

    fn create_graphics_pipeline(
        &self,
        config: &PipelineConfig,
        target: &RenderTarget,
        attachments: &[Attachment],
    ) -> Result<vk::Pipeline, DeviceError> {
        let mut modules: SmallVec<[vk::ShaderModule; 2]> = SmallVec::new();
        let destroy_modules = |modules: &[vk::ShaderModule]| {
            for module in modules {
                unsafe { self.inner.destroy_shader_module(*module, None) };
            }
        };
        for shader in config.shaders.iter() {
            match self.create_shader_module(&shader.source) {
                Ok(m) => modules.push(m),
                Err(e) => {
                    destroy_modules(modules.as_slice());
                    return Err(e);
                }
            }
        }

        let stages: SmallVec<[vk::PipelineShaderStageCreateInfo; 2]> = config
            .shaders
            .iter()
            .zip(modules.iter())
            .map(|(desc, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(desc.stage)
                    .module(*module)
                    .name(desc.entry.as_c_str())
            })
            .collect();

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: config.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_attributes: SmallVec<[vk::VertexInputAttributeDescription; 4]> = config
            .vertex_attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: 0,
                format: a.format,
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: config.viewport.width as f32,
            height: config.viewport.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: config.viewport,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = attachments.iter().any(|a| a.desc.is_depth());
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        //one blend state per color reference of the subpass, including unused locations
        let color_slots = attachments
            .iter()
            .filter_map(|a| match a.desc.usage {
                AttachmentUsage::Color(loc) => Some(loc as usize + 1),
                AttachmentUsage::DepthStencil => None,
            })
            .max()
            .unwrap_or(0);
        let blend_attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; 4]> = (0
            ..color_slots)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let layout = match unsafe {
            self.inner
                .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)
        } {
            Ok(l) => l,
            Err(e) => {
                destroy_modules(modules.as_slice());
                return Err(e.into());
            }
        };

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(layout)
            .render_pass(target.render_pass)
            .subpass(0);

        let created = unsafe {
            self.inner
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        };
        destroy_modules(modules.as_slice());

        match created {
            Ok(pipelines) if !pipelines.is_empty() => {
                let pipeline = pipelines[0];
                lock(&self.objects).pipelines.insert(pipeline, layout);
                Ok(pipeline)
            }
            Ok(_) => {
                unsafe { self.inner.destroy_pipeline_layout(layout, None) };
                Err(DeviceError::VkError(vk::Result::ERROR_UNKNOWN))
            }
            Err((_, e)) => {
                unsafe { self.inner.destroy_pipeline_layout(layout, None) };
                Err(e.into())
            }
        }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let layout = lock(&self.objects).pipelines.remove(&pipeline);
        unsafe {
            self.inner.destroy_pipeline(pipeline, None);
            if let Some(layout) = layout {
                self.inner.destroy_pipeline_layout(layout, None);
            }
        }
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, DeviceError> {
        let pool = lock(&self.command_pool);
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.inner.allocate_command_buffers(&info)? };
        buffers
            .into_iter()
            .next()
            .ok_or(DeviceError::VkError(vk::Result::ERROR_UNKNOWN))
    }

    fn encode(
        &self,
        command_buffer: vk::CommandBuffer,
        commands: &[Command],
    ) -> Result<(), DeviceError> {
        //recording implicitly resets buffers of a RESET_COMMAND_BUFFER pool, the pool however must be externally synchronised
        let _pool = lock(&self.command_pool);
        unsafe {
            self.inner
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())?
        };
        for cmd in commands {
            self.record(command_buffer, cmd);
        }
        unsafe { self.inner.end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let pool = lock(&self.command_pool);
        unsafe { self.inner.free_command_buffers(*pool, &[command_buffer]) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, DeviceError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        Ok(unsafe {
            self.inner
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        })
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool, DeviceError> {
        Ok(unsafe { self.inner.get_fence_status(fence)? })
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> Result<(), DeviceError> {
        unsafe { self.inner.wait_for_fences(&[fence], true, timeout)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<(), DeviceError> {
        unsafe { self.inner.reset_fences(&[fence])? };
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.inner.destroy_fence(fence, None) }
    }

    fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        signal: Option<vk::Fence>,
    ) -> Result<(), DeviceError> {
        let queue = lock(&self.queue);
        let submit = vk::SubmitInfo::default().command_buffers(command_buffers);
        unsafe {
            self.inner.queue_submit(
                queue.inner,
                &[submit],
                signal.unwrap_or(vk::Fence::null()),
            )?
        };
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(_e) = self.inner.device_wait_idle() {
                #[cfg(feature = "logging")]
                log::error!("Failed to wait for device idle while dropping: {}", _e);
            }

            let objects = std::mem::take(&mut *lock(&self.objects));
            #[cfg(feature = "logging")]
            if !objects.buffers.is_empty() || !objects.images.is_empty() {
                log::warn!(
                    "Dropping device with {} live buffers and {} live images",
                    objects.buffers.len(),
                    objects.images.len()
                );
            }
            for (pipeline, layout) in objects.pipelines {
                self.inner.destroy_pipeline(pipeline, None);
                self.inner.destroy_pipeline_layout(layout, None);
            }
            for (framebuffer, (render_pass, views)) in objects.render_targets {
                self.inner.destroy_framebuffer(framebuffer, None);
                for view in views {
                    self.inner.destroy_image_view(view, None);
                }
                self.inner.destroy_render_pass(render_pass, None);
            }
            for (buffer, allocation) in objects.buffers {
                self.inner.destroy_buffer(buffer, None);
                self.free_allocation(allocation);
            }
            for (image, allocation) in objects.images {
                self.inner.destroy_image(image, None);
                self.free_allocation(allocation);
            }

            self.inner
                .destroy_command_pool(*lock(&self.command_pool), None);
            //allocator must be gone before the device is destroyed
            ManuallyDrop::drop(&mut self.allocator);
            self.inner.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
