//! PRU subsystem memory mapped from `/dev/mem`.
//!
//! Layout of the PRU-ICSS window at `0x4A30_0000`:
//!
//! | Offset    | Region        | Use                                   |
//! |-----------|---------------|---------------------------------------|
//! | `0x00000` | PRU0 data RAM | raw capture window (256 words)        |
//! | `0x02000` | PRU1 data RAM | baseline samples + control words      |
//! | `0x10000` | shared RAM    | event ring (3072 words)               |
//!
//! Firmware is loaded and started through the remoteproc sysfs interface.

use memmap2::{MmapMut, MmapOptions};
use pops_common::consts::{CONTROL_REGION_WORDS, RAW_WORDS, RING_CAPACITY_WORDS, STOP_WORD, TAIL_WORD};
use pops_common::hal::driver::HalError;
use pops_common::hal::pru::{ControlRegion, CoprocessorMemory, RingBufferSource};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering, fence};
use tracing::{info, warn};

/// Physical base address of the PRU-ICSS.
pub const PRUSS_BASE: u64 = 0x4A30_0000;

const PRU0_DRAM_OFFSET: usize = 0x0_0000;
const PRU1_DRAM_OFFSET: usize = 0x0_2000;
const SHARED_RAM_OFFSET: usize = 0x1_0000;
const WINDOW_LEN: usize = SHARED_RAM_OFFSET + RING_CAPACITY_WORDS * 4;

/// PRU memory mapped from the physical memory device.
pub struct MappedPru {
    _map: MmapMut,
    raw: *mut u32,
    control: *mut u32,
    ring: *mut u32,
    head: AtomicUsize,
    remoteproc: Vec<PathBuf>,
}

// SAFETY: the pointers refer into `_map`, which lives as long as `self` and is
// never remapped. All access goes through volatile loads/stores of aligned
// u32 words shared with the coprocessor, never through Rust references.
unsafe impl Send for MappedPru {}
// SAFETY: see above; concurrent volatile word access is the hardware contract.
unsafe impl Sync for MappedPru {}

impl MappedPru {
    /// Map the PRU window from `mem_device` (normally `/dev/mem`).
    ///
    /// # Errors
    /// `HalError::MemoryMap` if the device cannot be opened or mapped.
    pub fn open(mem_device: &Path, remoteproc: Vec<PathBuf>) -> Result<Self, HalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(mem_device)
            .map_err(|e| HalError::MemoryMap(format!("{}: {e}", mem_device.display())))?;

        // SAFETY: the window is device memory shared only with the PRUs; it is
        // accessed exclusively through volatile word operations below.
        let mut map = unsafe {
            MmapOptions::new()
                .offset(PRUSS_BASE)
                .len(WINDOW_LEN)
                .map_mut(&file)
        }
        .map_err(|e| HalError::MemoryMap(format!("mmap PRUSS window: {e}")))?;

        let base = map.as_mut_ptr();
        // SAFETY: all offsets lie inside WINDOW_LEN and are 4-byte aligned.
        let (raw, control, ring) = unsafe {
            (
                base.add(PRU0_DRAM_OFFSET).cast::<u32>(),
                base.add(PRU1_DRAM_OFFSET).cast::<u32>(),
                base.add(SHARED_RAM_OFFSET).cast::<u32>(),
            )
        };

        info!("Mapped PRU memory from {}", mem_device.display());
        Ok(Self {
            _map: map,
            raw,
            control,
            ring,
            head: AtomicUsize::new(0),
            remoteproc,
        })
    }

    /// Load `firmware` into each coprocessor and start it.
    ///
    /// # Errors
    /// `HalError::FirmwareLoad` if any remoteproc write fails.
    pub fn start_firmware(&self, firmware: &[String]) -> Result<(), HalError> {
        if firmware.len() != self.remoteproc.len() {
            return Err(HalError::FirmwareLoad(format!(
                "{} firmware names for {} coprocessors",
                firmware.len(),
                self.remoteproc.len()
            )));
        }
        for (dir, name) in self.remoteproc.iter().zip(firmware) {
            let state = std::fs::read_to_string(dir.join("state")).unwrap_or_default();
            if state.trim() == "running" {
                write_sysfs(&dir.join("state"), "stop")?;
            }
            write_sysfs(&dir.join("firmware"), name)?;
            write_sysfs(&dir.join("state"), "start")?;
            info!("Started {} on {}", name, dir.display());
        }
        Ok(())
    }

    /// Halt both coprocessors.
    pub fn stop_firmware(&self) {
        for dir in &self.remoteproc {
            if let Err(e) = write_sysfs(&dir.join("state"), "stop") {
                warn!("Failed to stop {}: {e}", dir.display());
            }
        }
    }

    #[inline]
    fn load(base: *mut u32, index: usize, len: usize) -> u32 {
        debug_assert!(index < len);
        // SAFETY: index is bounded by the region length checked by callers.
        unsafe { base.add(index % len).read_volatile() }
    }

    #[inline]
    fn store(base: *mut u32, index: usize, len: usize, value: u32) {
        debug_assert!(index < len);
        // SAFETY: as in `load`.
        unsafe { base.add(index % len).write_volatile(value) }
    }
}

fn write_sysfs(path: &Path, value: &str) -> Result<(), HalError> {
    std::fs::write(path, value)
        .map_err(|e| HalError::FirmwareLoad(format!("{}: {e}", path.display())))
}

impl RingBufferSource for MappedPru {
    fn tail_address(&self) -> u32 {
        let tail = Self::load(self.control, TAIL_WORD, CONTROL_REGION_WORDS);
        fence(Ordering::Acquire);
        tail
    }

    fn read_ring_word(&self, offset: usize) -> u32 {
        Self::load(self.ring, offset, RING_CAPACITY_WORDS)
    }

    fn publish_head(&self, head: usize) {
        self.head.store(head, Ordering::Relaxed);
    }
}

impl ControlRegion for MappedPru {
    fn baseline_word(&self, index: usize) -> u32 {
        Self::load(self.control, index, CONTROL_REGION_WORDS)
    }

    fn write_control_word(&self, index: usize, value: u32) {
        fence(Ordering::Release);
        Self::store(self.control, index, CONTROL_REGION_WORDS, value);
    }

    fn stop_flag(&self) -> u32 {
        Self::load(self.control, STOP_WORD, CONTROL_REGION_WORDS)
    }

    fn raw_word(&self, index: usize) -> u32 {
        Self::load(self.raw, index, RAW_WORDS)
    }
}

impl CoprocessorMemory for MappedPru {
    fn write_ring_word(&self, offset: usize, value: u32) {
        Self::store(self.ring, offset, RING_CAPACITY_WORDS, value);
    }
}

impl Drop for MappedPru {
    fn drop(&mut self) {
        self.stop_firmware();
    }
}
