use ash::vk;

///Abstract queue that collects a [ash::vk::Queue](ash::vk::Queue) and its family.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl Queue {
    ///Returns the first queue family of `physical_device` that supports graphics work, which implies transfer work.
    pub fn find_graphics_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Option<(u32, vk::QueueFamilyProperties)> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        families
            .into_iter()
            .enumerate()
            .find(|(_, props)| {
                props.queue_count > 0 && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(idx, props)| (idx as u32, props))
    }
}
