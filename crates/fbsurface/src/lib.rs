//! C1: the Linux framebuffer device surface.
//!
//! Maps `/dev/fb0` (or an overridden path), exposes a pixel-addressable
//! subregion of it, and provides the colormap dance needed to re-enter
//! the virtual terminal cleanly (spec.md §4.1, §6).

mod ioctl;
mod mode;
mod spec;

pub use mode::{Channel, FbMode};
pub use spec::{DeviceSpec, Subregion};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;

use derive_more::{Display, Error};
use ioctl::{
    fb_fix_screeninfo, fb_var_screeninfo, ioctl_get, ioctl_set, FB_VISUAL_TRUECOLOR,
    FBIOGET_FSCREENINFO, FBIOGET_VSCREENINFO, FBIOGETCMAP, FBIOPUT_VSCREENINFO, FBIOPUTCMAP,
};

#[derive(Debug, Display, Error)]
pub enum FbError {
    #[display("failed to open framebuffer device: {_0}")]
    Open(io::Error),
    #[display("fbdev ioctl failed: {_0}")]
    Ioctl(io::Error),
    #[display("failed to mmap framebuffer memory: {_0}")]
    Mmap(io::Error),
    #[display("requested subregion does not fit inside the framebuffer")]
    SubregionOutOfBounds,
}

/// The mapped, optionally sub-regioned framebuffer surface.
pub struct FbSurface {
    _dev: File,
    fd: i32,
    mem: NonNull<u8>,
    map_len: usize,
    line_length: usize,
    mode: FbMode,
    var: fb_var_screeninfo,
    visual: u32,
    /// Pixel offset of the subregion's top-left corner.
    row_off: usize,
    col_off: usize,
    sub_rows: usize,
    sub_cols: usize,
    saved_cmap: Option<SavedCmap>,
}

struct SavedCmap {
    start: u32,
    red: Vec<u16>,
    green: Vec<u16>,
    blue: Vec<u16>,
}

// SAFETY: the mapped memory is owned exclusively by this surface and
// all mutation goes through `&mut self`.
unsafe impl Send for FbSurface {}

impl FbSurface {
    /// Open and map the device named by `device_spec` (`path` or
    /// `path:WxH+X+Y`). No other C1 operation may be called if this
    /// returns `Err` (spec.md §4.1's failure semantics).
    pub fn initialize(device_spec: &str) -> Result<FbSurface, FbError> {
        let spec = DeviceSpec::parse(device_spec);
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&spec.path)
            .map_err(FbError::Open)?;
        let fd = dev.as_raw_fd();

        let var: fb_var_screeninfo =
            unsafe { ioctl_get(fd, FBIOGET_VSCREENINFO) }.map_err(FbError::Ioctl)?;
        let fix: fb_fix_screeninfo =
            unsafe { ioctl_get(fd, FBIOGET_FSCREENINFO) }.map_err(FbError::Ioctl)?;

        let line_length = fix.line_length as usize;
        let map_len = line_length * var.yres_virtual.max(var.yres) as usize;

        let mem = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(FbError::Mmap(io::Error::last_os_error()));
        }
        let mem = NonNull::new(mem.cast::<u8>()).expect("mmap returned null without failing");

        let full_rows = var.yres as usize;
        let full_cols = var.xres as usize;
        let (row_off, col_off, sub_rows, sub_cols) = match spec.subregion {
            None => (0, 0, full_rows, full_cols),
            Some(Subregion { width, height, x, y }) => {
                let col_off = clamp_offset(x, full_cols);
                let row_off = clamp_offset(y, full_rows);
                let sub_cols = (width as usize).min(full_cols.saturating_sub(col_off));
                let sub_rows = (height as usize).min(full_rows.saturating_sub(row_off));
                if sub_cols == 0 || sub_rows == 0 {
                    unsafe { libc::munmap(mem.as_ptr().cast(), map_len) };
                    return Err(FbError::SubregionOutOfBounds);
                }
                (row_off, col_off, sub_rows, sub_cols)
            }
        };

        Ok(FbSurface {
            _dev: dev,
            fd,
            mem,
            map_len,
            line_length,
            mode: FbMode::from_var(&var),
            visual: fix.visual,
            var,
            row_off,
            col_off,
            sub_rows,
            sub_cols,
            saved_cmap: None,
        })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.sub_rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.sub_cols
    }

    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.mode.bytes_per_pixel as usize
    }

    #[must_use]
    pub fn mode(&self) -> FbMode {
        self.mode
    }

    #[must_use]
    pub fn pack(&self, r: u8, g: u8, b: u8) -> u32 {
        self.mode.pack(r, g, b)
    }

    /// Pointer to the start of subregion-relative row `row`. Panics if
    /// `row >= rows()`, the same contract every other C1 accessor uses
    /// for out-of-range subregion coordinates.
    pub fn row_ptr(&mut self, row: usize) -> &mut [u8] {
        assert!(row < self.sub_rows, "row {row} out of bounds ({})", self.sub_rows);
        let abs_row = self.row_off + row;
        let byte_off = abs_row * self.line_length + self.col_off * self.bytes_per_pixel();
        let len = self.sub_cols * self.bytes_per_pixel();
        unsafe {
            std::slice::from_raw_parts_mut(self.mem.as_ptr().add(byte_off), len.min(self.map_len - byte_off))
        }
    }

    /// Re-assert the variable screen info (in case a vt switch reset
    /// it) and, for indexed visuals, install a linear per-channel color
    /// map so truecolor-style `pack()` values still render correctly.
    pub fn enter(&mut self) -> Result<(), FbError> {
        unsafe { ioctl_set(self.fd, FBIOPUT_VSCREENINFO, &self.var) }.map_err(FbError::Ioctl)?;
        if self.visual != FB_VISUAL_TRUECOLOR {
            self.install_linear_cmap()?;
        }
        Ok(())
    }

    /// Restore whatever colormap was active before [`Self::enter`]
    /// installed the linear one.
    pub fn leave(&mut self) -> Result<(), FbError> {
        if let Some(saved) = self.saved_cmap.take() {
            let mut red = saved.red;
            let mut green = saved.green;
            let mut blue = saved.blue;
            let mut transp = vec![0u16; red.len()];
            let cmap = ioctl::fb_cmap {
                start: saved.start,
                len: red.len() as u32,
                red: red.as_mut_ptr(),
                green: green.as_mut_ptr(),
                blue: blue.as_mut_ptr(),
                transp: transp.as_mut_ptr(),
            };
            unsafe { ioctl_set(self.fd, FBIOPUTCMAP, &cmap) }.map_err(FbError::Ioctl)?;
        }
        Ok(())
    }

    fn install_linear_cmap(&mut self) -> Result<(), FbError> {
        let entries = 1usize << self.var.bits_per_pixel.min(8);
        if self.saved_cmap.is_none() {
            let mut red = vec![0u16; entries];
            let mut green = vec![0u16; entries];
            let mut blue = vec![0u16; entries];
            let mut transp = vec![0u16; entries];
            let mut cmap = ioctl::fb_cmap {
                start: 0,
                len: entries as u32,
                red: red.as_mut_ptr(),
                green: green.as_mut_ptr(),
                blue: blue.as_mut_ptr(),
                transp: transp.as_mut_ptr(),
            };
            match unsafe { ioctl_get_cmap(self.fd, &mut cmap) } {
                Ok(()) => self.saved_cmap = Some(SavedCmap { start: 0, red, green, blue }),
                Err(e) => tracing::warn!(error = %e, "failed to read current colormap, leave() will not restore one"),
            }
        }
        let linear: Vec<u16> = (0..entries)
            .map(|i| ((i * 0xFFFF) / (entries - 1).max(1)) as u16)
            .collect();
        let mut red = linear.clone();
        let mut green = linear.clone();
        let mut blue = linear;
        let mut transp = vec![0u16; entries];
        let cmap = ioctl::fb_cmap {
            start: 0,
            len: entries as u32,
            red: red.as_mut_ptr(),
            green: green.as_mut_ptr(),
            blue: blue.as_mut_ptr(),
            transp: transp.as_mut_ptr(),
        };
        unsafe { ioctl_set(self.fd, FBIOPUTCMAP, &cmap) }.map_err(FbError::Ioctl)
    }
}

unsafe fn ioctl_get_cmap(fd: i32, cmap: &mut ioctl::fb_cmap) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd, FBIOGETCMAP as _, cmap as *mut ioctl::fb_cmap) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn clamp_offset(v: i32, bound: usize) -> usize {
    (v.max(0) as usize).min(bound)
}

impl Drop for FbSurface {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mem.as_ptr().cast(), self.map_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_offset_never_negative() {
        assert_eq!(clamp_offset(-5, 100), 0);
        assert_eq!(clamp_offset(10, 100), 10);
    }
}
