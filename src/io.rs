//! In-memory FFmpeg I/O.
//!
//! [`MemoryInput`] demuxes straight from a borrowed byte slice through a
//! custom `AVIOContext`, so no temporary file is needed. [`MemoryOutput`]
//! muxes into a growable buffer through a seekable custom `AVIOContext`;
//! being seekable lets the MP4 muxer patch its index after the last packet
//! the same way it would on disk.
//!
//! Both types own raw FFmpeg allocations and release them on drop in the
//! order FFmpeg requires: the format context first, then the I/O buffer and
//! context, then the cursor the callbacks point at.

use std::ffi::{CString, c_int, c_void};
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_next::format::context::Input;
use ffmpeg_sys_next::{AVERROR_EOF, AVFMT_FLAG_CUSTOM_IO, AVFormatContext, AVIOContext};

use crate::error::SampleError;

const IO_BUFFER_SIZE: usize = 64 * 1024;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;
const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;
const AVERROR_EINVAL: i64 = -22;

struct ReadCursor<'a> {
    data: &'a [u8],
    position: usize,
}

struct WriteCursor {
    data: Vec<u8>,
    position: usize,
}

fn resolve_seek(position: usize, length: usize, offset: i64, whence: c_int) -> Option<i64> {
    let base = match whence & !AVSEEK_FORCE {
        SEEK_SET => 0,
        SEEK_CUR => position as i64,
        SEEK_END => length as i64,
        _ => return None,
    };
    let target = base.checked_add(offset)?;
    (target >= 0).then_some(target)
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buffer: *mut u8, size: c_int) -> c_int {
    let cursor = unsafe { &mut *(opaque as *mut ReadCursor<'_>) };
    let remaining = cursor.data.len().saturating_sub(cursor.position);
    if remaining == 0 {
        return AVERROR_EOF;
    }

    let count = remaining.min(size.max(0) as usize);
    unsafe {
        ptr::copy_nonoverlapping(cursor.data.as_ptr().add(cursor.position), buffer, count);
    }
    cursor.position += count;
    count as c_int
}

unsafe extern "C" fn seek_read(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let cursor = unsafe { &mut *(opaque as *mut ReadCursor<'_>) };
    if whence & AVSEEK_SIZE != 0 {
        return cursor.data.len() as i64;
    }

    match resolve_seek(cursor.position, cursor.data.len(), offset, whence) {
        Some(target) if target as usize <= cursor.data.len() => {
            cursor.position = target as usize;
            target
        }
        _ => AVERROR_EINVAL,
    }
}

unsafe extern "C" fn write_packet(opaque: *mut c_void, buffer: *const u8, size: c_int) -> c_int {
    let cursor = unsafe { &mut *(opaque as *mut WriteCursor) };
    if size <= 0 {
        return 0;
    }

    let bytes = unsafe { std::slice::from_raw_parts(buffer, size as usize) };
    let end = cursor.position + bytes.len();
    if end > cursor.data.len() {
        cursor.data.resize(end, 0);
    }
    cursor.data[cursor.position..end].copy_from_slice(bytes);
    cursor.position = end;
    size
}

unsafe extern "C" fn seek_write(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let cursor = unsafe { &mut *(opaque as *mut WriteCursor) };
    if whence & AVSEEK_SIZE != 0 {
        return cursor.data.len() as i64;
    }

    match resolve_seek(cursor.position, cursor.data.len(), offset, whence) {
        Some(target) => {
            cursor.position = target as usize;
            target
        }
        None => AVERROR_EINVAL,
    }
}

/// Free a custom I/O context together with whatever buffer it currently
/// owns (FFmpeg may have replaced the one we allocated).
unsafe fn free_io_context(mut avio: *mut AVIOContext) {
    if avio.is_null() {
        return;
    }
    unsafe {
        ffmpeg_sys_next::av_freep(&mut (*avio).buffer as *mut *mut u8 as *mut c_void);
        ffmpeg_sys_next::avio_context_free(&mut avio);
    }
}

unsafe fn alloc_io_buffer() -> Result<*mut u8, SampleError> {
    let buffer = unsafe { ffmpeg_sys_next::av_malloc(IO_BUFFER_SIZE) as *mut u8 };
    if buffer.is_null() {
        return Err(SampleError::FfmpegError(
            "failed to allocate I/O buffer".to_string(),
        ));
    }
    Ok(buffer)
}

/// A demuxer reading from a borrowed byte slice.
///
/// Dereferences to [`Input`], so it is used exactly like a file-backed
/// input context.
pub(crate) struct MemoryInput<'a> {
    input: ManuallyDrop<Input>,
    avio: *mut AVIOContext,
    cursor: *mut ReadCursor<'a>,
    _source: PhantomData<&'a [u8]>,
}

impl<'a> MemoryInput<'a> {
    /// Open a container from `data` and read its stream information.
    pub(crate) fn open(data: &'a [u8]) -> Result<Self, SampleError> {
        if data.is_empty() {
            return Err(SampleError::UnsupportedFormat(
                "empty input buffer".to_string(),
            ));
        }

        unsafe {
            let cursor = Box::into_raw(Box::new(ReadCursor { data, position: 0 }));
            let release_cursor = |cursor: *mut ReadCursor<'a>| drop(Box::from_raw(cursor));

            let buffer = match alloc_io_buffer() {
                Ok(buffer) => buffer,
                Err(error) => {
                    release_cursor(cursor);
                    return Err(error);
                }
            };

            let avio = ffmpeg_sys_next::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                cursor as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_read),
            );
            if avio.is_null() {
                ffmpeg_sys_next::av_free(buffer as *mut c_void);
                release_cursor(cursor);
                return Err(SampleError::FfmpegError(
                    "failed to allocate I/O context".to_string(),
                ));
            }

            let mut context = ffmpeg_sys_next::avformat_alloc_context();
            if context.is_null() {
                free_io_context(avio);
                release_cursor(cursor);
                return Err(SampleError::FfmpegError(
                    "failed to allocate format context".to_string(),
                ));
            }
            (*context).pb = avio;
            (*context).flags |= AVFMT_FLAG_CUSTOM_IO as c_int;

            // On failure avformat_open_input frees the context itself.
            let result = ffmpeg_sys_next::avformat_open_input(
                &mut context,
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            );
            if result < 0 {
                free_io_context(avio);
                release_cursor(cursor);
                return Err(SampleError::UnsupportedFormat(format!(
                    "unrecognised container: {}",
                    FfmpegError::from(result)
                )));
            }

            let result = ffmpeg_sys_next::avformat_find_stream_info(context, ptr::null_mut());
            if result < 0 {
                ffmpeg_sys_next::avformat_close_input(&mut context);
                free_io_context(avio);
                release_cursor(cursor);
                return Err(SampleError::UnsupportedFormat(format!(
                    "cannot read stream information: {}",
                    FfmpegError::from(result)
                )));
            }

            Ok(Self {
                input: ManuallyDrop::new(Input::wrap(context)),
                avio,
                cursor,
                _source: PhantomData,
            })
        }
    }
}

impl Deref for MemoryInput<'_> {
    type Target = Input;

    fn deref(&self) -> &Input {
        &self.input
    }
}

impl DerefMut for MemoryInput<'_> {
    fn deref_mut(&mut self) -> &mut Input {
        &mut self.input
    }
}

impl Drop for MemoryInput<'_> {
    fn drop(&mut self) {
        unsafe {
            // Closing a custom-I/O input leaves `pb` alone.
            ManuallyDrop::drop(&mut self.input);
            free_io_context(self.avio);
            drop(Box::from_raw(self.cursor));
        }
    }
}

/// A muxer writing into a growable, seekable memory buffer.
pub(crate) struct MemoryOutput {
    context: *mut AVFormatContext,
    avio: *mut AVIOContext,
    cursor: *mut WriteCursor,
}

impl MemoryOutput {
    /// Allocate a muxer for the given short format name (e.g. `"mp4"`).
    pub(crate) fn new(format_name: &str) -> Result<Self, SampleError> {
        let format_name_c = CString::new(format_name).map_err(|error| {
            SampleError::EncodeFailure(format!("invalid container format name: {error}"))
        })?;

        unsafe {
            let mut context: *mut AVFormatContext = ptr::null_mut();
            let result = ffmpeg_sys_next::avformat_alloc_output_context2(
                &mut context,
                ptr::null(),
                format_name_c.as_ptr(),
                ptr::null(),
            );
            if result < 0 || context.is_null() {
                return Err(SampleError::EncodeFailure(format!(
                    "failed to allocate '{format_name}' muxer"
                )));
            }

            let cursor = Box::into_raw(Box::new(WriteCursor {
                data: Vec::new(),
                position: 0,
            }));

            let buffer = match alloc_io_buffer() {
                Ok(buffer) => buffer,
                Err(error) => {
                    ffmpeg_sys_next::avformat_free_context(context);
                    drop(Box::from_raw(cursor));
                    return Err(error);
                }
            };

            let avio = ffmpeg_sys_next::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                1,
                cursor as *mut c_void,
                None,
                Some(write_packet),
                Some(seek_write),
            );
            if avio.is_null() {
                ffmpeg_sys_next::av_free(buffer as *mut c_void);
                ffmpeg_sys_next::avformat_free_context(context);
                drop(Box::from_raw(cursor));
                return Err(SampleError::EncodeFailure(
                    "failed to allocate output I/O context".to_string(),
                ));
            }

            (*context).pb = avio;
            (*context).flags |= AVFMT_FLAG_CUSTOM_IO as c_int;

            Ok(Self {
                context,
                avio,
                cursor,
            })
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut AVFormatContext {
        self.context
    }

    /// Returns `true` if the muxer wants codec extradata in a global header.
    pub(crate) fn needs_global_header(&self) -> bool {
        unsafe {
            let format = (*self.context).oformat;
            !format.is_null()
                && ((*format).flags & ffmpeg_sys_next::AVFMT_GLOBALHEADER as c_int) != 0
        }
    }

    /// Flush pending output and return everything written so far.
    ///
    /// Call after the trailer has been written.
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        unsafe {
            ffmpeg_sys_next::avio_flush(self.avio);
            std::mem::take(&mut (*self.cursor).data)
        }
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        unsafe {
            (*self.context).pb = ptr::null_mut();
            ffmpeg_sys_next::avformat_free_context(self.context);
            free_io_context(self.avio);
            drop(Box::from_raw(self.cursor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_resolution_handles_whence_and_force_flag() {
        assert_eq!(resolve_seek(10, 100, 5, SEEK_SET), Some(5));
        assert_eq!(resolve_seek(10, 100, 5, SEEK_CUR), Some(15));
        assert_eq!(resolve_seek(10, 100, -5, SEEK_END), Some(95));
        assert_eq!(resolve_seek(10, 100, 5, SEEK_SET | AVSEEK_FORCE), Some(5));
        assert_eq!(resolve_seek(10, 100, -20, SEEK_CUR), None);
        assert_eq!(resolve_seek(10, 100, 0, 7), None);
    }

    #[test]
    fn empty_input_is_unsupported() {
        assert!(matches!(
            MemoryInput::open(&[]),
            Err(SampleError::UnsupportedFormat(_))
        ));
    }
}
