use crate::config::SEGMENT_INIT_TIMEOUT;
use crate::core::models::SharedRecord;
use crate::error::{WardenError, WardenResult};
use raw_sync::locks::{LockImpl, LockInit, Mutex};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Segment layout: `[init flag | pad][raw_sync mutex | pad][SharedRecord]`.
const INIT_FLAG_REGION: usize = 8;
const READY: u8 = 1;

#[derive(Debug, Error)]
pub(crate) enum SegmentError {
    #[error("shared memory region too small for the shared record")]
    RegionTooSmall,
    #[error("shared memory error: {0}")]
    Shmem(#[from] ShmemError),
    #[error("shared lock init failed: {0}")]
    LockInit(String),
    #[error("segment creator never finished initialisation")]
    InitTimeout,
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Bytes requested when creating the segment. Uses the worst-case mutex
/// padding so any mapping address fits.
pub fn segment_size() -> usize {
    let lock_region = align_up(Mutex::size_of(None), 8);
    INIT_FLAG_REGION + lock_region + std::mem::size_of::<SharedRecord>() + 8
}

/// Handle on the named shared record and its cross-process mutex.
///
/// Each process (and each test) opens its own handle; workers never inherit
/// one from their parent.
pub struct SharedStore {
    name: String,
    shm: Shmem,
    lock: Box<dyn LockImpl>,
}

// SAFETY: the record is only reached through `with_lock`, which holds the
// process-shared mutex. That mutex serialises threads of this process the
// same way it serialises other processes, and the mapping itself stays valid
// for the lifetime of the handle.
unsafe impl Send for SharedStore {}
unsafe impl Sync for SharedStore {}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("name", &self.name)
            .field("len", &self.shm.len())
            .finish()
    }
}

impl SharedStore {
    /// Attach to `name`, creating it first when missing and allowed to.
    pub fn open(name: &str, create_if_missing: bool) -> WardenResult<Self> {
        let result = match open_existing(name) {
            Ok(store) => Ok(store),
            Err(SegmentError::Shmem(ShmemError::MapOpenFailed(_)))
            | Err(SegmentError::Shmem(ShmemError::LinkDoesNotExist))
            | Err(SegmentError::Shmem(ShmemError::NoLinkOrOsId))
                if create_if_missing =>
            {
                create_or_retry(name)
            }
            Err(err) => Err(err),
        };

        result.map_err(|err| to_warden(err, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with exclusive access to the record. The mutex is released on
    /// every exit path of `f`, unwinding included.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut SharedRecord) -> T) -> WardenResult<T> {
        let guard = self
            .lock
            .lock()
            .map_err(|e| WardenError::lock("acquire", e.to_string()))?;

        // SAFETY: the guard points at the record region computed in
        // `attach`, which is in bounds, 8-byte aligned and exclusively ours
        // until the guard drops.
        let record = unsafe { &mut *(*guard as *mut SharedRecord) };
        Ok(f(record))
    }

    /// Locked copy of the whole record.
    pub fn snapshot(&self) -> WardenResult<SharedRecord> {
        self.with_lock(|record| *record)
    }

    /// Unlink the named segment. Processes still attached keep their mapping
    /// until they exit. Returns `false` if nothing was there.
    pub fn remove(name: &str) -> WardenResult<bool> {
        match ShmemConf::new().os_id(name).size(segment_size()).open() {
            Ok(mut shm) => {
                let _ = shm.set_owner(true);
                drop(shm);
                debug!(segment = name, "shared segment removed");
                Ok(true)
            }
            Err(ShmemError::MapOpenFailed(_))
            | Err(ShmemError::LinkDoesNotExist)
            | Err(ShmemError::NoLinkOrOsId) => Ok(false),
            Err(err) => Err(to_warden(SegmentError::Shmem(err), name)),
        }
    }
}

fn open_existing(name: &str) -> Result<SharedStore, SegmentError> {
    let shm = ShmemConf::new().os_id(name).size(segment_size()).open()?;
    attach(name, shm, false)
}

fn create_or_retry(name: &str) -> Result<SharedStore, SegmentError> {
    let conf = ShmemConf::new().os_id(name).size(segment_size());
    match conf.create() {
        Ok(mut shm) => {
            // ensure the mapping survives after the creator exits
            let _ = shm.set_owner(false);
            debug!(segment = name, size = shm.len(), "created shared segment");
            attach(name, shm, true)
        }
        Err(ShmemError::MappingIdExists) => open_existing(name),
        Err(e) => Err(SegmentError::from(e)),
    }
}

fn attach(name: &str, shm: Shmem, init: bool) -> Result<SharedStore, SegmentError> {
    let base = shm.as_ptr();
    let total_len = shm.len();

    // SAFETY: every mapping is at least one page, far larger than the flag.
    let lock_ptr = unsafe { base.add(INIT_FLAG_REGION) };
    let lock_region = align_up(Mutex::size_of(Some(lock_ptr)), 8);
    let record_offset = INIT_FLAG_REGION + lock_region;

    if total_len < record_offset + std::mem::size_of::<SharedRecord>() {
        return Err(SegmentError::RegionTooSmall);
    }

    // SAFETY: bounds checked just above; the mapping base is page aligned so
    // the offsets stay 8-byte aligned.
    let record_ptr = unsafe { base.add(record_offset) };
    let ready = unsafe { &*(base as *const AtomicU8) };

    let lock = if init {
        let (lock, _) = unsafe { Mutex::new(lock_ptr, record_ptr) }
            .map_err(|e| SegmentError::LockInit(e.to_string()))?;
        ready.store(READY, Ordering::Release);
        lock
    } else {
        wait_until_ready(name, ready)?;
        let (lock, _) = unsafe { Mutex::from_existing(lock_ptr, record_ptr) }
            .map_err(|e| SegmentError::LockInit(e.to_string()))?;
        lock
    };

    Ok(SharedStore {
        name: name.to_string(),
        shm,
        lock,
    })
}

fn wait_until_ready(name: &str, ready: &AtomicU8) -> Result<(), SegmentError> {
    let started = Instant::now();
    while ready.load(Ordering::Acquire) != READY {
        if started.elapsed() >= SEGMENT_INIT_TIMEOUT {
            warn!(
                segment = name,
                "shared segment exists but was never initialised; run `teardown` to reset it"
            );
            return Err(SegmentError::InitTimeout);
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    Ok(())
}

fn to_warden(err: SegmentError, name: &str) -> WardenError {
    match err {
        SegmentError::Shmem(source) => WardenError::SegmentUnavailable {
            name: name.to_string(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        },
        other => WardenError::segment(name, other.to_string()),
    }
}
