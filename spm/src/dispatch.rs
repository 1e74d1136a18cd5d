//! Trap entry and opcode dispatch.
//!
//! The hardware-facing shim saves the caller's registers into a
//! [`TrapFrame`] and calls [`Spm::handle_trap`] with a closure that can
//! fetch instruction halfwords from the caller's code. Everything
//! ISA-specific stays in that shim; the core only sees an already-decoded
//! opcode and four argument words.

use crate::error::Error;
use crate::svc;
use crate::Spm;

/// Saved caller registers, in the order the trap entry stacks them:
/// four argument words, link register, return address, status register.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub r: [usize; 4],
    pub lr: usize,
    pub ret_addr: usize,
    pub xpsr: usize,
}

/// Link-register bit set when the trap arrived from secure execution.
pub const EXC_RETURN_SECURE: usize = 1 << 6;

/// What the embedding shim must do after a trap was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Resume the trapping context; its status is in `frame.r[0]`.
    Resume,
    /// Exception-return into this partition's context. If the partition
    /// was woken out of `wait`, its pending signals stay asserted and a
    /// polling re-issue of `wait` observes them.
    Enter { partition_idx: usize },
    /// Resume the caller that was blocked on `partition_idx`'s reply,
    /// delivering `status` as the call's return value.
    Return { partition_idx: usize, status: isize },
    /// The running partition parked itself in `wait`; nothing is runnable
    /// until a matching signal arrives (`Spm::resume_suspended`).
    Suspend { partition_idx: usize },
    /// Non-returning violation: halt the offending context. Never resume
    /// past this.
    Fatal(Error),
    /// Unknown opcode: reported, no state change.
    Ignored,
}

/// Pull the opcode out of the trapping instruction: the low byte of the
/// 16-bit instruction immediately before the saved return address.
pub fn decode_opcode(
    frame: &TrapFrame,
    fetch: impl Fn(usize) -> Option<u16>,
) -> Option<u8> {
    let insn_addr = frame.ret_addr.checked_sub(2)?;
    let insn = fetch(insn_addr)?;
    Some((insn & 0xff) as u8)
}

impl Spm {
    /// Main trap entry.
    ///
    /// A trap observed while already unwinding into the non-secure return
    /// path cannot have been raised by the non-secure side; the link
    /// value is handed back untouched and nothing is dispatched.
    pub fn handle_trap(
        &mut self,
        frame: &mut TrapFrame,
        fetch: impl Fn(usize) -> Option<u16>,
    ) -> Outcome {
        if frame.lr & EXC_RETURN_SECURE == 0 {
            warn!("trap on the non-secure return path, lr {:#x}", frame.lr);
            return Outcome::Resume;
        }
        let op = match decode_opcode(frame, fetch) {
            Some(op) => op as usize,
            None => {
                error!("trapping instruction at {:#x} unreadable", frame.ret_addr);
                return Outcome::Ignored;
            }
        };
        self.dispatch(op, frame)
    }

    /// Dispatch one decoded operation. Public seam: the boot path and the
    /// tests drive it without a hardware trap.
    pub fn dispatch(&mut self, op: usize, frame: &mut TrapFrame) -> Outcome {
        let constraint = match svc::constraint::pick(op) {
            Some(c) => c,
            None => {
                error!("unhandled SVC {:#04x}", op);
                return Outcome::Ignored;
            }
        };
        let mut args = frame.r;
        for word in args.iter_mut().skip(constraint.arg_num) {
            *word = 0;
        }
        trace!("SVC {:<22} {:X?}", svc::to_str(op), &args[..constraint.arg_num]);

        match op {
            svc::VERSION => self.svc_version(frame),
            svc::SERVICE_VERSION => self.svc_service_version(args, frame),
            svc::CONNECT => self.svc_connect(args, frame),
            svc::CALL => self.svc_call(args, frame),
            svc::CLOSE => self.svc_close(args, frame),
            svc::REQUEST => self.svc_request(args, frame),
            svc::REQUEST_RETURN => self.svc_request_return(args),
            svc::WAIT => self.svc_wait(args, frame),
            svc::GET => self.svc_get(args, frame),
            svc::SET_RHANDLE => self.svc_set_rhandle(args, frame),
            svc::READ => self.svc_read(args, frame),
            svc::SKIP => self.svc_skip(args, frame),
            svc::WRITE => self.svc_write(args, frame),
            svc::REPLY => self.svc_reply(args),
            svc::NOTIFY => self.svc_notify(args, frame),
            svc::CLEAR => self.svc_clear(frame),
            svc::EOI => self.svc_eoi(args, frame),
            svc::VALIDATE_SECURE_CALLER => self.svc_validate_secure_caller(frame),
            svc::GET_CALLER_CLIENT_ID => self.svc_get_caller_client_id(args, frame),
            svc::MEMORY_CHECK => self.svc_memory_check(args, frame),
            svc::SET_SHARE_AREA => self.svc_set_share_area(args, frame),
            svc::GET_BOOT_DATA => self.svc_get_boot_data(args, frame),
            svc::OUTPUT_LOG => self.svc_output_log(args, frame),
            _ => {
                error!("unhandled SVC {:#04x}", op);
                Outcome::Ignored
            }
        }
    }
}

/// Write a status (or success value) into the return slot and resume.
pub(crate) fn ret_status(frame: &mut TrapFrame, res: Result<usize, Error>) -> Outcome {
    frame.r[0] = match res {
        Ok(value) => value,
        Err(err) => usize::from(err),
    };
    Outcome::Resume
}
