use glam::{Quat, Vec3};
use openxr as xr;

use visor_xr::error::RuntimeError;
use visor_xr::types::{
    EnvironmentBlendMode, FormFactor, Fov, Pose, ReferenceSpaceType, RuntimeEvent, SessionState,
    SwapchainUsage, Version, View, ViewConfigView, ViewConfigurationType,
};

pub fn xr_err(e: xr::sys::Result) -> RuntimeError {
    RuntimeError::new(e.into_raw(), format!("{e:?}"))
}

pub fn handle_invalid() -> RuntimeError {
    xr_err(xr::sys::Result::ERROR_HANDLE_INVALID)
}

pub fn version(v: xr::Version) -> Version {
    Version::new(v.major(), v.minor(), v.patch())
}

pub fn xr_version(v: Version) -> xr::Version {
    xr::Version::new(v.major(), v.minor(), v.patch())
}

/// Names of the extensions set in `set`, in `XR_*` spelling.
pub fn extension_names(set: &xr::ExtensionSet) -> Vec<String> {
    let known = [
        (set.khr_opengl_enable, "XR_KHR_opengl_enable"),
        (set.khr_vulkan_enable2, "XR_KHR_vulkan_enable2"),
        (set.khr_composition_layer_depth, "XR_KHR_composition_layer_depth"),
        (set.ext_debug_utils, "XR_EXT_debug_utils"),
        (set.ext_hand_tracking, "XR_EXT_hand_tracking"),
    ];
    known
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, name)| name.to_string())
        .chain(
            set.other
                .iter()
                .map(|raw| String::from_utf8_lossy(raw).into_owned()),
        )
        .collect()
}

pub fn extension_set(names: &[String]) -> xr::ExtensionSet {
    let mut set = xr::ExtensionSet::default();
    for name in names {
        match name.as_str() {
            "XR_KHR_opengl_enable" => set.khr_opengl_enable = true,
            "XR_KHR_vulkan_enable2" => set.khr_vulkan_enable2 = true,
            "XR_KHR_composition_layer_depth" => set.khr_composition_layer_depth = true,
            "XR_EXT_debug_utils" => set.ext_debug_utils = true,
            "XR_EXT_hand_tracking" => set.ext_hand_tracking = true,
            other => set.other.push(other.as_bytes().to_vec()),
        }
    }
    set
}

pub fn form_factor(form_factor: FormFactor) -> xr::FormFactor {
    match form_factor {
        FormFactor::HeadMountedDisplay => xr::FormFactor::HEAD_MOUNTED_DISPLAY,
        FormFactor::HandheldDisplay => xr::FormFactor::HANDHELD_DISPLAY,
    }
}

pub fn view_config(ty: ViewConfigurationType) -> xr::ViewConfigurationType {
    match ty {
        ViewConfigurationType::PrimaryMono => xr::ViewConfigurationType::PRIMARY_MONO,
        ViewConfigurationType::PrimaryStereo => xr::ViewConfigurationType::PRIMARY_STEREO,
        ViewConfigurationType::Other(raw) => xr::ViewConfigurationType::from_raw(raw),
    }
}

pub fn view_config_from(ty: xr::ViewConfigurationType) -> ViewConfigurationType {
    match ty {
        xr::ViewConfigurationType::PRIMARY_MONO => ViewConfigurationType::PrimaryMono,
        xr::ViewConfigurationType::PRIMARY_STEREO => ViewConfigurationType::PrimaryStereo,
        other => ViewConfigurationType::Other(other.into_raw()),
    }
}

pub fn reference_space(ty: ReferenceSpaceType) -> xr::ReferenceSpaceType {
    match ty {
        ReferenceSpaceType::View => xr::ReferenceSpaceType::VIEW,
        ReferenceSpaceType::Local => xr::ReferenceSpaceType::LOCAL,
        ReferenceSpaceType::Stage => xr::ReferenceSpaceType::STAGE,
        ReferenceSpaceType::Other(raw) => xr::ReferenceSpaceType::from_raw(raw),
    }
}

pub fn reference_space_from(ty: xr::ReferenceSpaceType) -> ReferenceSpaceType {
    match ty {
        xr::ReferenceSpaceType::VIEW => ReferenceSpaceType::View,
        xr::ReferenceSpaceType::LOCAL => ReferenceSpaceType::Local,
        xr::ReferenceSpaceType::STAGE => ReferenceSpaceType::Stage,
        other => ReferenceSpaceType::Other(other.into_raw()),
    }
}

pub fn view_config_view(view: &xr::ViewConfigurationView) -> ViewConfigView {
    ViewConfigView {
        recommended_width: view.recommended_image_rect_width,
        recommended_height: view.recommended_image_rect_height,
        max_width: view.max_image_rect_width,
        max_height: view.max_image_rect_height,
        recommended_sample_count: view.recommended_swapchain_sample_count,
    }
}

pub fn usage(usage: SwapchainUsage) -> xr::SwapchainUsageFlags {
    let pairs = [
        (SwapchainUsage::COLOR_ATTACHMENT, xr::SwapchainUsageFlags::COLOR_ATTACHMENT),
        (
            SwapchainUsage::DEPTH_STENCIL_ATTACHMENT,
            xr::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ),
        (SwapchainUsage::TRANSFER_SRC, xr::SwapchainUsageFlags::TRANSFER_SRC),
        (SwapchainUsage::TRANSFER_DST, xr::SwapchainUsageFlags::TRANSFER_DST),
        (SwapchainUsage::SAMPLED, xr::SwapchainUsageFlags::SAMPLED),
    ];
    pairs
        .iter()
        .filter(|(ours, _)| usage.contains(*ours))
        .fold(xr::SwapchainUsageFlags::EMPTY, |acc, (_, theirs)| acc | *theirs)
}

pub fn blend_mode(mode: EnvironmentBlendMode) -> xr::EnvironmentBlendMode {
    match mode {
        EnvironmentBlendMode::Opaque => xr::EnvironmentBlendMode::OPAQUE,
        EnvironmentBlendMode::Additive => xr::EnvironmentBlendMode::ADDITIVE,
        EnvironmentBlendMode::AlphaBlend => xr::EnvironmentBlendMode::ALPHA_BLEND,
    }
}

pub fn posef(pose: Pose) -> xr::Posef {
    let q = pose.orientation;
    let p = pose.position;
    xr::Posef {
        orientation: xr::Quaternionf {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        },
        position: xr::Vector3f {
            x: p.x,
            y: p.y,
            z: p.z,
        },
    }
}

pub fn pose(pose: xr::Posef) -> Pose {
    let q = pose.orientation;
    let p = pose.position;
    Pose {
        position: Vec3::new(p.x, p.y, p.z),
        orientation: Quat::from_xyzw(q.x, q.y, q.z, q.w),
    }
}

pub fn fovf(fov: Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

pub fn view(view: &xr::View) -> View {
    View {
        pose: pose(view.pose),
        fov: Fov {
            angle_left: view.fov.angle_left,
            angle_right: view.fov.angle_right,
            angle_up: view.fov.angle_up,
            angle_down: view.fov.angle_down,
        },
    }
}

pub fn event(event: xr::Event<'_>) -> RuntimeEvent {
    match event {
        xr::Event::EventsLost(e) => RuntimeEvent::EventsLost {
            lost_event_count: e.lost_event_count(),
        },
        xr::Event::InstanceLossPending(e) => RuntimeEvent::InstanceLossPending {
            loss_time: e.loss_time().as_nanos(),
        },
        xr::Event::SessionStateChanged(e) => RuntimeEvent::SessionStateChanged {
            state: SessionState::from_raw(e.state().into_raw()),
            time: e.time().as_nanos(),
        },
        xr::Event::ReferenceSpaceChangePending(e) => RuntimeEvent::ReferenceSpaceChangePending {
            space_type: reference_space_from(e.reference_space_type()),
        },
        xr::Event::InteractionProfileChanged(_) => RuntimeEvent::InteractionProfileChanged,
        // the wrapper hides the structure type of events it does not model
        _ => RuntimeEvent::Unknown { raw_type: 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_names_round_trip_known_and_other() {
        let names = vec![
            "XR_KHR_opengl_enable".to_string(),
            "XR_MNDX_egl_enable".to_string(),
        ];
        let set = extension_set(&names);
        assert!(set.khr_opengl_enable);
        assert_eq!(set.other, vec![b"XR_MNDX_egl_enable".to_vec()]);
        assert_eq!(extension_names(&set), names);
    }

    #[test]
    fn test_usage_bits_match_runtime() {
        let flags = usage(SwapchainUsage::SAMPLED | SwapchainUsage::COLOR_ATTACHMENT);
        assert!(flags.contains(xr::SwapchainUsageFlags::SAMPLED));
        assert!(flags.contains(xr::SwapchainUsageFlags::COLOR_ATTACHMENT));
        assert!(!flags.contains(xr::SwapchainUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_pose_conversion_keeps_components() {
        let ours = Pose {
            position: Vec3::new(0.1, 1.6, -0.2),
            orientation: Quat::from_rotation_y(0.5),
        };
        assert_eq!(pose(posef(ours)), ours);
    }
}
