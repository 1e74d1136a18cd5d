//! Core-internal operations: a running partition introspecting its own
//! call context without re-entering the request protocol. Failures here
//! are plain statuses; nothing on this surface moves the state machine.

extern crate alloc;

use alloc::string::String;

use crate::boot;
use crate::call::mem_write;
use crate::dispatch::{ret_status, Outcome, TrapFrame};
use crate::error::Error;
use crate::mm::Share;
use crate::svc;
use crate::Spm;

impl Spm {
    pub(crate) fn svc_validate_secure_caller(&mut self, frame: &mut TrapFrame) -> Outcome {
        let caller = self.caller();
        let res = if caller.is_ns {
            Err(Error::AccessDenied)
        } else {
            Ok(svc::SUCCESS as usize)
        };
        ret_status(frame, res)
    }

    pub(crate) fn svc_get_caller_client_id(
        &mut self,
        args: [usize; 4],
        frame: &mut TrapFrame,
    ) -> Outcome {
        let out_ptr = args[0];
        let caller = self.caller();
        if caller.is_ns {
            return ret_status(frame, Err(Error::AccessDenied));
        }
        if out_ptr == 0
            || !self.memory.check(
                out_ptr,
                core::mem::size_of::<i32>(),
                true,
                false,
                caller.privileged,
                self.partitions.get(caller.idx).runtime.share,
            )
        {
            return ret_status(frame, Err(Error::InvalidParameter));
        }
        let client_id = self.partitions.get(caller.idx).runtime.caller_client_id;
        unsafe { mem_write(out_ptr, client_id) };
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_memory_check(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let ptr = args[0];
        let len = args[1];
        let access = args[2];
        let caller = self.caller();
        let share = self.partitions.get(caller.idx).runtime.share;

        let want_write = access & svc::ACCESS_WRITE != 0;
        let granted = self
            .memory
            .check(ptr, len, want_write, caller.is_ns, caller.privileged, share)
            && (access & svc::ACCESS_READ == 0
                || self
                    .memory
                    .check(ptr, len, false, caller.is_ns, caller.privileged, share));
        let res = if granted {
            Ok(svc::SUCCESS as usize)
        } else {
            Err(Error::AccessDenied)
        };
        ret_status(frame, res)
    }

    pub(crate) fn svc_set_share_area(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let caller = self.caller();
        if caller.is_ns {
            return ret_status(frame, Err(Error::AccessDenied));
        }
        let share = match Share::try_from(args[0]) {
            Ok(share) => share,
            Err(err) => return ret_status(frame, Err(err)),
        };
        self.partitions.get_mut(caller.idx).runtime.share = share;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_get_boot_data(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let major_type = args[0] as u16;
        let buf_ptr = args[1];
        let len = args[2];
        let caller = self.caller();

        if buf_ptr == 0 {
            return ret_status(frame, Err(Error::InvalidParameter));
        }
        let share = self.partitions.get(caller.idx).runtime.share;
        if !self
            .memory
            .check(buf_ptr, len, true, caller.is_ns, caller.privileged, share)
        {
            return ret_status(frame, Err(Error::AccessDenied));
        }
        let area = match self.boot_data {
            Some(area) => area,
            None => return ret_status(frame, Err(Error::NotFound)),
        };
        let buf = unsafe { core::slice::from_raw_parts_mut(buf_ptr as *mut u8, len) };
        ret_status(frame, boot::find_boot_record(area, major_type, buf))
    }

    pub(crate) fn svc_output_log(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let ptr = args[0];
        let len = args[1];
        let caller = self.caller();

        if ptr == 0 || len == 0 {
            return ret_status(frame, Err(Error::InvalidParameter));
        }
        let share = self.partitions.get(caller.idx).runtime.share;
        if !self
            .memory
            .check(ptr, len, false, caller.is_ns, caller.privileged, share)
        {
            return ret_status(frame, Err(Error::AccessDenied));
        }
        let bytes = unsafe { core::slice::from_raw_parts(ptr as *const u8, len) };
        let text = String::from_utf8_lossy(bytes);
        info!("partition {:#x}: {}", caller.client_id, text);
        ret_status(frame, Ok(len))
    }
}
