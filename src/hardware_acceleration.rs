//! Hardware-accelerated decoding.
//!
//! Available with the `hardware` feature. The codec backend calls
//! [`open_hardware_decoder`] when a GPU is requested; any failure is reported
//! as [`SampleError::HardwareAccelUnavailable`] and the caller decides
//! whether to fall back to software.
//!
//! Availability depends on both the FFmpeg build and the host's drivers. Use
//! [`available_hardware_devices`] to see what the linked FFmpeg supports.

use std::ffi::{CString, c_int};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ptr;

use ffmpeg_next::{
    codec::{Parameters, context::Context as CodecContext},
    decoder::Video as VideoDecoder,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::{AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVHWDeviceType};

use crate::error::SampleError;

/// Hardware device families FFmpeg can decode on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareDeviceType {
    /// NVIDIA CUDA / NVDEC.
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows).
    Dxva2,
    /// Direct3D 11 Video Acceleration (Windows).
    D3d11va,
    /// Apple VideoToolbox.
    VideoToolbox,
    /// Intel Quick Sync Video.
    Qsv,
}

impl HardwareDeviceType {
    fn from_av(device_type: AVHWDeviceType) -> Option<Self> {
        match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDeviceType::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDeviceType::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HardwareDeviceType::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDeviceType::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HardwareDeviceType::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDeviceType::Qsv),
            _ => None,
        }
    }

    fn to_av(self) -> AVHWDeviceType {
        match self {
            HardwareDeviceType::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
            HardwareDeviceType::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            HardwareDeviceType::Dxva2 => AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2,
            HardwareDeviceType::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
            HardwareDeviceType::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            HardwareDeviceType::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        }
    }

    /// Device string selecting GPU `gpu_id` for this family, or `None` to
    /// let FFmpeg pick its default device.
    fn device_name(self, gpu_id: u32) -> Option<String> {
        match self {
            HardwareDeviceType::Cuda | HardwareDeviceType::Dxva2 | HardwareDeviceType::D3d11va => {
                Some(gpu_id.to_string())
            }
            HardwareDeviceType::Vaapi => Some(format!("/dev/dri/renderD{}", 128 + gpu_id)),
            HardwareDeviceType::VideoToolbox | HardwareDeviceType::Qsv => None,
        }
    }
}

impl Display for HardwareDeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            HardwareDeviceType::Cuda => "cuda",
            HardwareDeviceType::Vaapi => "vaapi",
            HardwareDeviceType::Dxva2 => "dxva2",
            HardwareDeviceType::D3d11va => "d3d11va",
            HardwareDeviceType::VideoToolbox => "videotoolbox",
            HardwareDeviceType::Qsv => "qsv",
        };
        f.write_str(name)
    }
}

/// List the hardware device types supported by the linked FFmpeg build.
pub fn available_hardware_devices() -> Vec<HardwareDeviceType> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }
        if let Some(device) = HardwareDeviceType::from_av(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// A decoder with a hardware device context attached.
pub(crate) struct HardwareDecoder {
    pub(crate) decoder: VideoDecoder,
    pub(crate) device: HardwareDeviceType,
}

/// Open a hardware decoder for the stream described by `parameters` on GPU
/// `gpu_id`.
///
/// Device families the codec advertises are tried in order; the first whose
/// device context can be created wins.
pub(crate) fn open_hardware_decoder(
    parameters: Parameters,
    gpu_id: u32,
    thread_count: Option<usize>,
) -> Result<HardwareDecoder, SampleError> {
    let mut codec_context = CodecContext::from_parameters(parameters)
        .map_err(|error| SampleError::HardwareAccelUnavailable(error.to_string()))?;

    let candidates = supported_device_types(&codec_context);
    if candidates.is_empty() {
        return Err(SampleError::HardwareAccelUnavailable(
            "codec has no hardware decode configuration".to_string(),
        ));
    }

    let mut failures = Vec::new();
    for device in candidates {
        match create_hardware_device_context(device, gpu_id) {
            Ok(mut device_context) => {
                unsafe {
                    let context = codec_context.as_mut_ptr();
                    (*context).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(device_context);
                    crate::demuxer::report_corruption(context);
                    if let Some(threads) = thread_count {
                        (*context).thread_count = crate::demuxer::clamp_thread_count(threads);
                    }
                    // The codec context holds its own reference now.
                    ffmpeg_sys_next::av_buffer_unref(&mut device_context);
                }

                let decoder = codec_context
                    .decoder()
                    .video()
                    .map_err(|error| SampleError::HardwareAccelUnavailable(error.to_string()))?;
                log::info!("Hardware decoding enabled on {device} (GPU {gpu_id})");
                return Ok(HardwareDecoder { decoder, device });
            }
            Err(reason) => {
                log::debug!("Hardware device {device} unavailable: {reason}");
                failures.push(format!("{device}: {reason}"));
            }
        }
    }

    Err(SampleError::HardwareAccelUnavailable(failures.join("; ")))
}

/// Download a frame living in GPU memory into system memory.
///
/// Returns `None` for frames that are already in system memory.
pub(crate) fn transfer_hardware_frame(
    frame: &VideoFrame,
) -> Result<Option<VideoFrame>, SampleError> {
    let is_hardware_frame = unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() };
    if !is_hardware_frame {
        return Ok(None);
    }

    let mut software_frame = VideoFrame::empty();
    let result = unsafe {
        ffmpeg_sys_next::av_hwframe_transfer_data(software_frame.as_mut_ptr(), frame.as_ptr(), 0)
    };
    if result < 0 {
        return Err(SampleError::FfmpegError(format!(
            "hardware frame transfer failed: {}",
            ffmpeg_next::Error::from(result)
        )));
    }

    unsafe {
        ffmpeg_sys_next::av_frame_copy_props(software_frame.as_mut_ptr(), frame.as_ptr());
    }
    Ok(Some(software_frame))
}

fn supported_device_types(codec_context: &CodecContext) -> Vec<HardwareDeviceType> {
    let codec = unsafe { (*codec_context.as_ptr()).codec };
    if codec.is_null() {
        return Vec::new();
    }

    let mut devices = Vec::new();
    let mut index: c_int = 0;
    loop {
        let config = unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec, index) };
        if config.is_null() {
            break;
        }

        let (methods, device_type) = unsafe { ((*config).methods, (*config).device_type) };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as c_int) != 0 {
            if let Some(device) = HardwareDeviceType::from_av(device_type) {
                if !devices.contains(&device) {
                    devices.push(device);
                }
            }
        }
        index += 1;
    }

    devices
}

/// Create a device context. The returned buffer must be released with
/// `av_buffer_unref`.
fn create_hardware_device_context(
    device: HardwareDeviceType,
    gpu_id: u32,
) -> Result<*mut AVBufferRef, String> {
    let name = device
        .device_name(gpu_id)
        .map(CString::new)
        .transpose()
        .map_err(|error| error.to_string())?;

    let mut device_context: *mut AVBufferRef = ptr::null_mut();
    let result = unsafe {
        ffmpeg_sys_next::av_hwdevice_ctx_create(
            &mut device_context,
            device.to_av(),
            name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
            ptr::null_mut(),
            0,
        )
    };

    if result < 0 {
        Err(ffmpeg_next::Error::from(result).to_string())
    } else {
        Ok(device_context)
    }
}
