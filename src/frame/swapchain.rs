// Swapchain manager - presentable images, views and framebuffers
//
// Owns the one swapchain tied to the window surface. It can be destroyed and
// created again any number of times without touching the device, the
// pipeline or the frame slots. Format, present mode and extent are chosen
// fresh from the surface on every build.

use anyhow::{Context, Result};
use ash::vk;

use super::{FrameError, GpuContext, SurfaceSupport, SwapchainDesc};

/// What we'd like the swapchain to look like, if the surface allows it
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPreferences {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// A live swapchain and everything that depends on its images
#[derive(Debug)]
pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl SwapchainState {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    // Framebuffers first, then views, then the swapchain that owns the images
    fn release<G: GpuContext>(self, gpu: &G) {
        for framebuffer in self.framebuffers {
            gpu.destroy_framebuffer(framebuffer);
        }
        for view in self.image_views {
            gpu.destroy_image_view(view);
        }
        gpu.destroy_swapchain(self.swapchain);
    }
}

/// Pick the preferred (format, color space) pair, else whatever comes first
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferences: &SwapchainPreferences,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == preferences.format && f.color_space == preferences.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// Preferred mode if offered, else FIFO (always supported)
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Fixed surface extent wins; `u32::MAX` means "size it to the window"
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_size.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_size.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Turn surface support + preferences into a creation request
pub fn describe(
    support: &SurfaceSupport,
    preferences: &SwapchainPreferences,
    window_size: vk::Extent2D,
) -> Result<SwapchainDesc, FrameError> {
    let surface_format =
        choose_surface_format(&support.formats, preferences).ok_or(FrameError::NoSurfaceFormats)?;
    if support.present_modes.is_empty() {
        return Err(FrameError::NoPresentModes);
    }
    let present_mode = choose_present_mode(&support.present_modes, preferences.present_mode);

    let extent = choose_extent(&support.capabilities, window_size);
    if extent.width == 0 || extent.height == 0 {
        return Err(FrameError::ZeroExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    Ok(SwapchainDesc {
        surface_format,
        present_mode,
        extent,
        min_image_count: choose_image_count(&support.capabilities),
        pre_transform: support.capabilities.current_transform,
    })
}

/// Owns the current swapchain state and rebuilds it on demand
#[derive(Debug)]
pub struct SwapchainManager {
    preferences: SwapchainPreferences,
    state: Option<SwapchainState>,
    generation: u64,
}

impl SwapchainManager {
    pub fn new(preferences: SwapchainPreferences) -> Self {
        Self {
            preferences,
            state: None,
            generation: 0,
        }
    }

    /// Build a swapchain for the given window pixel size.
    ///
    /// Any previous swapchain is destroyed first: a surface can only have
    /// one swapchain at a time.
    pub fn create<G: GpuContext>(
        &mut self,
        gpu: &G,
        window_size: vk::Extent2D,
    ) -> Result<&SwapchainState> {
        self.destroy(gpu);

        let support = gpu.surface_support().context("Failed to query surface support")?;
        let desc = describe(&support, &self.preferences, window_size)?;

        let (swapchain, images) = gpu
            .create_swapchain(&desc)
            .context("Failed to create swapchain")?;

        let mut state = SwapchainState {
            swapchain,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: desc.surface_format.format,
            present_mode: desc.present_mode,
            extent: desc.extent,
        };

        if let Err(e) = Self::create_targets(gpu, &mut state) {
            state.release(gpu);
            return Err(e);
        }

        self.generation += 1;
        log::info!(
            "Created swapchain #{}: {}x{}, {} images, {:?}, {:?}",
            self.generation,
            state.extent.width,
            state.extent.height,
            state.image_count(),
            state.format,
            state.present_mode
        );

        let state: &SwapchainState = self.state.insert(state);
        Ok(state)
    }

    // One view and one framebuffer per image, sized to the new extent
    fn create_targets<G: GpuContext>(gpu: &G, state: &mut SwapchainState) -> Result<()> {
        for &image in &state.images {
            let view = gpu
                .create_image_view(image, state.format)
                .context("Failed to create image view")?;
            state.image_views.push(view);
        }
        for &view in &state.image_views {
            let framebuffer = gpu
                .create_framebuffer(view, state.extent)
                .context("Failed to create framebuffer")?;
            state.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Release views, framebuffers and the swapchain. No-op without one.
    pub fn destroy<G: GpuContext>(&mut self, gpu: &G) {
        if let Some(state) = self.state.take() {
            log::debug!("Destroying swapchain #{}", self.generation);
            state.release(gpu);
        }
    }

    /// Destroy followed by create
    pub fn rebuild<G: GpuContext>(
        &mut self,
        gpu: &G,
        window_size: vk::Extent2D,
    ) -> Result<&SwapchainState> {
        self.destroy(gpu);
        self.create(gpu, window_size)
    }

    pub fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    /// Number of swapchains built so far
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::{Call, MockGpu};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_requested_surface_format() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM), format(vk::Format::B8G8R8A8_SRGB)];
        let chosen = choose_surface_format(&formats, &SwapchainPreferences::default()).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_surface_format() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM), format(vk::Format::B8G8R8A8_UNORM)];
        let chosen = choose_surface_format(&formats, &SwapchainPreferences::default()).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn color_space_must_match_too() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        let chosen = choose_surface_format(&formats, &SwapchainPreferences::default()).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert!(choose_surface_format(&[], &SwapchainPreferences::default()).is_none());
    }

    #[test]
    fn present_mode_prefers_mailbox_then_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_surface_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1024, 768),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!((chosen.width, chosen.height), (1024, 768));
    }

    #[test]
    fn indeterminate_extent_is_clamped_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(1920, 1080),
            ..Default::default()
        };

        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!((chosen.width, chosen.height), (800, 600));

        let chosen = choose_extent(&caps, extent(50, 5000));
        assert_eq!((chosen.width, chosen.height), (100, 1080));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn create_builds_one_target_per_image() {
        let gpu = MockGpu::new();
        let mut manager = SwapchainManager::new(SwapchainPreferences::default());

        let state = manager.create(&gpu, extent(800, 600)).unwrap();
        assert_eq!((state.extent.width, state.extent.height), (800, 600));
        assert_eq!(state.image_count(), 3);
        assert_eq!(state.image_views.len(), 3);
        assert_eq!(state.framebuffers.len(), 3);
        assert_eq!(state.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(state.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn rebuild_is_idempotent_for_unchanged_size() {
        let gpu = MockGpu::new();
        let mut manager = SwapchainManager::new(SwapchainPreferences::default());
        manager.create(&gpu, extent(800, 600)).unwrap();

        let first = {
            let state = manager.rebuild(&gpu, extent(800, 600)).unwrap();
            (state.extent.width, state.extent.height, state.image_count())
        };
        let second = {
            let state = manager.rebuild(&gpu, extent(800, 600)).unwrap();
            (state.extent.width, state.extent.height, state.image_count())
        };

        assert_eq!(first, second);
        assert_eq!(gpu.live_swapchains(), 1);
        assert_eq!(gpu.live_framebuffers(), 3);
        assert!(gpu.violations().is_empty());
    }

    #[test]
    fn rebuild_destroys_before_creating() {
        let gpu = MockGpu::new();
        let mut manager = SwapchainManager::new(SwapchainPreferences::default());
        let old = manager.create(&gpu, extent(800, 600)).unwrap().swapchain;
        gpu.clear_calls();

        manager.rebuild(&gpu, extent(640, 480)).unwrap();

        let calls = gpu.calls();
        let destroyed = calls
            .iter()
            .position(|c| *c == Call::DestroySwapchain(old))
            .unwrap();
        let created = calls
            .iter()
            .position(|c| matches!(c, Call::CreateSwapchain { width: 640, height: 480, .. }))
            .unwrap();
        assert!(destroyed < created);
        assert!(gpu.violations().is_empty());
    }

    #[test]
    fn surface_without_formats_is_fatal() {
        let gpu = MockGpu::new();
        let mut support = gpu.surface_support().unwrap();
        support.formats.clear();
        gpu.set_support(support);

        let mut manager = SwapchainManager::new(SwapchainPreferences::default());
        let err = manager.create(&gpu, extent(800, 600)).unwrap_err();
        assert_eq!(err.downcast_ref::<FrameError>(), Some(&FrameError::NoSurfaceFormats));
        assert!(manager.state().is_none());
    }

    #[test]
    fn surface_without_present_modes_is_fatal() {
        let gpu = MockGpu::new();
        let mut support = gpu.surface_support().unwrap();
        support.present_modes.clear();
        gpu.set_support(support);

        let mut manager = SwapchainManager::new(SwapchainPreferences::default());
        let err = manager.create(&gpu, extent(800, 600)).unwrap_err();
        assert_eq!(err.downcast_ref::<FrameError>(), Some(&FrameError::NoPresentModes));
    }

    #[test]
    fn zero_extent_is_refused() {
        let gpu = MockGpu::with_fixed_extent(0, 0);
        let mut manager = SwapchainManager::new(SwapchainPreferences::default());

        let err = manager.create(&gpu, extent(800, 600)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::ZeroExtent { .. })
        ));
        assert_eq!(gpu.live_swapchains(), 0);
    }

    #[test]
    fn destroy_leaves_nothing_behind() {
        let gpu = MockGpu::new();
        let mut manager = SwapchainManager::new(SwapchainPreferences::default());
        manager.create(&gpu, extent(800, 600)).unwrap();

        manager.destroy(&gpu);
        manager.destroy(&gpu);

        assert!(manager.state().is_none());
        assert_eq!(gpu.live_resources(), 0);
    }
}
