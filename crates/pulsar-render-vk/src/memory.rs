// SPDX-License-Identifier: CEPL-1.0
//! Buffer and image allocation with one `VkDeviceMemory` per resource.
//!
//! Owners free their memory on drop and keep [`AllocatorStats`] current, which
//! is how leaks across swapchain rebuilds show up in logs.
use std::sync::Arc;

use ash::vk;
use portable_atomic::{AtomicU64, Ordering};
use pulsar_core::{Error, Result};
use tracing::trace;

/// Where a buffer lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    /// GPU-only; filled through a staging copy.
    DeviceLocal,
    /// Persistently mapped, coherent; written by the CPU every frame.
    HostVisible,
    /// Short-lived upload source.
    Staging,
}

impl MemoryLocation {
    /// `(required, preferred)` property flags.
    pub fn flags(self) -> (vk::MemoryPropertyFlags, vk::MemoryPropertyFlags) {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        match self {
            MemoryLocation::DeviceLocal => (vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::empty()),
            MemoryLocation::HostVisible => (host, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::Staging => (host, vk::MemoryPropertyFlags::empty()),
        }
    }

    pub fn is_mapped(self) -> bool {
        !matches!(self, MemoryLocation::DeviceLocal)
    }
}

/// Picks a memory type allowed by `type_bits` that has every `required` flag,
/// preferring one that also has the `preferred` flags.
pub fn select_memory_type(
    types: &[vk::MemoryType],
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    preferred: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let find = |want: vk::MemoryPropertyFlags| {
        types
            .iter()
            .enumerate()
            .find(|(i, t)| type_bits & (1 << i) != 0 && t.property_flags.contains(want))
            .map(|(i, _)| i as u32)
    };
    if !preferred.is_empty() {
        if let Some(i) = find(required | preferred) {
            return Some(i);
        }
    }
    find(required)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_allocations: u64,
    pub live_bytes: u64,
    pub total_allocations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicU64,
    bytes: AtomicU64,
    total: AtomicU64,
}

impl Counters {
    fn on_alloc(&self, size: u64) {
        self.live.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn on_free(&self, size: u64) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(size, Ordering::Relaxed);
    }
}

pub struct Allocator {
    device: ash::Device,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    counters: Arc<Counters>,
}

impl Allocator {
    pub fn new(instance: &ash::Instance, phys: vk::PhysicalDevice, device: &ash::Device) -> Self {
        let memory_props = unsafe { instance.get_physical_device_memory_properties(phys) };
        Self {
            device: device.clone(),
            memory_props,
            counters: Arc::default(),
        }
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            live_allocations: self.counters.live.load(Ordering::Relaxed),
            live_bytes: self.counters.bytes.load(Ordering::Relaxed),
            total_allocations: self.counters.total.load(Ordering::Relaxed),
        }
    }

    fn memory_types(&self) -> &[vk::MemoryType] {
        &self.memory_props.memory_types[..self.memory_props.memory_type_count as usize]
    }

    fn allocate(
        &self,
        what: &'static str,
        req: vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> Result<vk::DeviceMemory> {
        let (required, preferred) = location.flags();
        let type_index = select_memory_type(self.memory_types(), req.memory_type_bits, required, preferred)
            .ok_or_else(|| Error::OutOfMemory {
                what,
                detail: format!("no memory type with {required:?} in mask {:#b}", req.memory_type_bits),
            })?;
        let info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: type_index,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&info, None) }.map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfMemory {
                what,
                detail: format!("{e:?}"),
            },
            other => Error::resource(what, other),
        })
    }

    pub fn create_buffer(
        &self,
        what: &'static str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Buffer> {
        let d = &self.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let handle = unsafe { d.create_buffer(&bci, None) }.map_err(|e| Error::resource(what, e))?;
        let req = unsafe { d.get_buffer_memory_requirements(handle) };
        let memory = match self.allocate(what, req, location) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_buffer(handle, None) };
                return Err(e);
            }
        };
        let mut buffer = Buffer {
            device: d.clone(),
            counters: self.counters.clone(),
            handle,
            memory,
            size,
            alloc_size: req.size,
            mapped: std::ptr::null_mut(),
        };
        self.counters.on_alloc(req.size);

        unsafe { d.bind_buffer_memory(handle, memory, 0) }.map_err(|e| Error::resource(what, e))?;
        if location.is_mapped() {
            buffer.mapped = unsafe { d.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) }
                .map_err(|e| Error::resource(what, e))?
                .cast();
        }
        trace!("{what}: {size} bytes ({location:?})");
        Ok(buffer)
    }

    /// Creates an image together with its bound memory and a view over every
    /// mip level.
    pub fn create_image(
        &self,
        what: &'static str,
        info: &vk::ImageCreateInfo,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Image> {
        let d = &self.device;
        let handle = unsafe { d.create_image(info, None) }.map_err(|e| Error::resource(what, e))?;
        let req = unsafe { d.get_image_memory_requirements(handle) };
        let memory = match self.allocate(what, req, MemoryLocation::DeviceLocal) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_image(handle, None) };
                return Err(e);
            }
        };
        let mut image = Image {
            device: d.clone(),
            counters: self.counters.clone(),
            handle,
            memory,
            view: vk::ImageView::null(),
            format: info.format,
            alloc_size: req.size,
        };
        self.counters.on_alloc(req.size);

        unsafe { d.bind_image_memory(handle, memory, 0) }.map_err(|e| Error::resource(what, e))?;
        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: handle,
            view_type: vk::ImageViewType::TYPE_2D,
            format: info.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: info.mip_levels.max(1),
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        image.view = unsafe { d.create_image_view(&view_ci, None) }.map_err(|e| Error::resource(what, e))?;
        Ok(image)
    }
}

pub struct Buffer {
    device: ash::Device,
    counters: Arc<Counters>,
    pub handle: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    alloc_size: vk::DeviceSize,
    mapped: *mut u8,
}

impl Buffer {
    /// Copies `data` into a mapped buffer at `offset`.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        if self.mapped.is_null() {
            return Err(Error::resource("buffer write", "buffer is not host-visible"));
        }
        if offset + data.len() as u64 > self.size {
            return Err(Error::resource(
                "buffer write",
                format!("{} bytes at {offset} overflow {}", data.len(), self.size),
            ));
        }
        // Coherent memory, no flush needed.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.handle, None);
            self.device.free_memory(self.memory, None);
        }
        self.counters.on_free(self.alloc_size);
    }
}

pub struct Image {
    device: ash::Device,
    counters: Arc<Counters>,
    pub handle: vk::Image,
    memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    alloc_size: vk::DeviceSize,
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.handle, None);
            self.device.free_memory(self.memory, None);
        }
        self.counters.on_free(self.alloc_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(flags: vk::MemoryPropertyFlags) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        }
    }

    fn desktop_types() -> Vec<vk::MemoryType> {
        use vk::MemoryPropertyFlags as F;
        vec![
            ty(F::DEVICE_LOCAL),
            ty(F::HOST_VISIBLE | F::HOST_COHERENT),
            ty(F::HOST_VISIBLE | F::HOST_COHERENT | F::HOST_CACHED),
            ty(F::DEVICE_LOCAL | F::HOST_VISIBLE | F::HOST_COHERENT),
        ]
    }

    #[test]
    fn host_visible_is_mappable_and_prefers_device_local() {
        let types = desktop_types();
        let (req, pref) = MemoryLocation::HostVisible.flags();
        let i = select_memory_type(&types, 0b1111, req, pref).unwrap();
        assert_eq!(i, 3);
        assert!(types[i as usize].property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
    }

    #[test]
    fn preferred_falls_back_to_required() {
        let types = desktop_types();
        let (req, pref) = MemoryLocation::HostVisible.flags();
        // BAR type masked out
        let i = select_memory_type(&types, 0b0111, req, pref).unwrap();
        assert_eq!(i, 1);
    }

    #[test]
    fn type_bits_are_respected() {
        let types = desktop_types();
        let (req, pref) = MemoryLocation::DeviceLocal.flags();
        assert_eq!(select_memory_type(&types, 0b1111, req, pref), Some(0));
        assert_eq!(select_memory_type(&types, 0b1000, req, pref), Some(3));
        assert_eq!(select_memory_type(&types, 0b0110, req, pref), None);
    }

    #[test]
    fn staging_never_needs_device_local() {
        let types = desktop_types();
        let (req, pref) = MemoryLocation::Staging.flags();
        assert!(pref.is_empty());
        assert_eq!(select_memory_type(&types, 0b1111, req, pref), Some(1));
        assert!(!MemoryLocation::DeviceLocal.is_mapped());
        assert!(MemoryLocation::Staging.is_mapped());
    }
}
