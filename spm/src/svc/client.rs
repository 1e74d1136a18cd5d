//! Client-facing operations: the connect/call/close protocol, direct
//! function requests, and the version queries.
//!
//! Failure policy (deliberate, see the error design): malformed-but-honest
//! parameters come back as a negative status; a forged handle, a
//! forbidden service or a memory-validation failure never returns to the
//! caller.

use crate::call::{mem_read, CallerInfo, RequestArgs};
use crate::config::{CORE_ID, MAX_IOVEC, NON_SECURE_ID, NULL_HANDLE, SFN_HANDLE_BASE};
use crate::connection::Connection;
use crate::dispatch::{ret_status, Outcome, TrapFrame};
use crate::error::Error;
use crate::mm::Share;
use crate::partition::state::PartitionState;
use crate::partition::{IoVec, Message, MsgInfo, ServiceConfig};
use crate::svc;
use crate::Spm;

pub(crate) fn is_builtin(id: u32) -> bool {
    id == NON_SECURE_ID || id == CORE_ID
}

/// Descriptor a direct function request passes by reference.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SfnRequest {
    pub sid: u32,
    pub in_vec: usize,
    pub in_len: usize,
    pub out_vec: usize,
    pub out_len: usize,
}

impl Spm {
    pub(crate) fn svc_version(&mut self, frame: &mut TrapFrame) -> Outcome {
        frame.r[0] = svc::framework_version();
        Outcome::Resume
    }

    pub(crate) fn svc_service_version(
        &mut self,
        args: [usize; 4],
        frame: &mut TrapFrame,
    ) -> Outcome {
        let sid = args[0] as u32;
        let caller = self.caller();
        frame.r[0] = match self.partitions.find_service(sid) {
            Some((_, service)) if !caller.is_ns || service.allow_ns => {
                service.minor_version as usize
            }
            _ => svc::VERSION_NONE,
        };
        Outcome::Resume
    }

    pub(crate) fn svc_connect(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let sid = args[0] as u32;
        let minor = args[1] as u32;
        let caller = self.caller();

        // an id nobody advertises is refused, not fatal; only violations
        // against a service that exists terminate the caller
        let (partition_idx, service) = match self.partitions.find_service(sid) {
            Some(found) => found,
            None => return ret_status(frame, Err(Error::ConnectionRefused)),
        };
        if caller.is_ns && !service.allow_ns {
            error!("ns connect to forbidden service {:#x}", sid);
            return Outcome::Fatal(Error::SecurityViolation);
        }
        if minor > service.minor_version {
            error!(
                "connect to service {:#x} v{} with v{}",
                sid, service.minor_version, minor
            );
            return Outcome::Fatal(Error::SecurityViolation);
        }

        let target = self.partitions.get(partition_idx);
        if !target.is_ipc() {
            return ret_status(frame, Err(Error::ConnectionRefused));
        }
        if target.state() == PartitionState::Closed {
            return ret_status(frame, Err(Error::ConnectionRefused));
        }

        match self.connections.alloc(Connection {
            sid,
            partition_idx,
            client_id: caller.client_id,
            rhandle: 0,
            in_call: false,
        }) {
            Some(handle) => ret_status(frame, Ok(handle)),
            None => ret_status(frame, Err(Error::Busy)),
        }
    }

    pub(crate) fn svc_call(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let handle = args[0];
        let invec_ptr = args[1];
        let outvec_ptr = args[2];
        let (in_len, out_len) = svc::unpack_vec_counts(args[3]);
        let caller = self.caller();

        let conn = match self.connections.lookup(handle) {
            Some(conn) => *conn,
            None => {
                error!("call on dead handle {:#x}", handle);
                return Outcome::Fatal(Error::SecurityViolation);
            }
        };
        if conn.client_id != caller.client_id || conn.in_call {
            return Outcome::Fatal(Error::SecurityViolation);
        }

        // vector-count limit first, before any memory validation
        if in_len + out_len > MAX_IOVEC {
            return ret_status(frame, Err(Error::InvalidParameter));
        }

        let callee_idx = conn.partition_idx;
        let service = match self.service_of(callee_idx, conn.sid) {
            Some(service) => service,
            None => return Outcome::Fatal(Error::SecurityViolation),
        };
        if let Err(err) = self.target_can_accept(callee_idx, service.signal) {
            return ret_status(frame, Err(err));
        }

        let invec = match self.load_iovecs(&caller, invec_ptr, in_len, false) {
            Ok(vecs) => vecs,
            Err(Error::AccessDenied) => return Outcome::Fatal(Error::AccessDenied),
            Err(err) => return ret_status(frame, Err(err)),
        };
        let outvec = match self.load_iovecs(&caller, outvec_ptr, out_len, true) {
            Ok(vecs) => vecs,
            Err(Error::AccessDenied) => return Outcome::Fatal(Error::AccessDenied),
            Err(err) => return ret_status(frame, Err(err)),
        };

        let msg = Message {
            info: msg_info(handle, caller.client_id, &invec, in_len, &outvec, out_len, conn.rhandle),
            connection_slot: handle.checked_sub(crate::config::HANDLE_BASE),
            signal: service.signal,
        };
        let req = RequestArgs {
            invec,
            in_len,
            outvec,
            out_len,
            out_array_ptr: outvec_ptr,
            msg,
            init: false,
        };
        if let Err(err) = self.begin_request(callee_idx, req) {
            return Outcome::Fatal(err);
        }
        if let Some(conn) = self.connections.lookup_mut(handle) {
            conn.in_call = true;
        }
        Outcome::Enter {
            partition_idx: callee_idx,
        }
    }

    pub(crate) fn svc_close(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let handle = args[0];
        if handle == NULL_HANDLE {
            return ret_status(frame, Ok(svc::SUCCESS as usize));
        }
        let caller = self.caller();
        let conn = match self.connections.lookup(handle) {
            Some(conn) => *conn,
            None => {
                error!("close on dead handle {:#x}", handle);
                return Outcome::Fatal(Error::SecurityViolation);
            }
        };
        if conn.client_id != caller.client_id || conn.in_call {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        self.connections.free(handle);
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    /// Direct function request: enters the target partition without a
    /// connection. Boot-time init calls come down the same path.
    pub(crate) fn svc_request(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let desc_ptr = args[0];
        let caller = self.caller();

        if desc_ptr == 0 {
            return ret_status(frame, Err(Error::InvalidParameter));
        }
        if !self.memory.check(
            desc_ptr,
            core::mem::size_of::<SfnRequest>(),
            false,
            caller.is_ns,
            caller.privileged,
            Share::None,
        ) {
            return Outcome::Fatal(Error::AccessDenied);
        }
        let desc: SfnRequest = unsafe { mem_read(desc_ptr) };

        let (callee_idx, service) = match self.partitions.find_service(desc.sid) {
            Some(found) => found,
            None => return ret_status(frame, Err(Error::ConnectionRefused)),
        };
        if caller.is_ns && !service.allow_ns {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        if self.partitions.get(callee_idx).is_ipc() {
            // message-model services take requests through connections only
            return Outcome::Fatal(Error::SecurityViolation);
        }

        if desc.in_len + desc.out_len > MAX_IOVEC {
            return ret_status(frame, Err(Error::InvalidParameter));
        }
        if let Err(err) = self.target_can_accept(callee_idx, 0) {
            return ret_status(frame, Err(err));
        }

        let invec = match self.load_iovecs(&caller, desc.in_vec, desc.in_len, false) {
            Ok(vecs) => vecs,
            Err(Error::AccessDenied) => return Outcome::Fatal(Error::AccessDenied),
            Err(err) => return ret_status(frame, Err(err)),
        };
        let outvec = match self.load_iovecs(&caller, desc.out_vec, desc.out_len, true) {
            Ok(vecs) => vecs,
            Err(Error::AccessDenied) => return Outcome::Fatal(Error::AccessDenied),
            Err(err) => return ret_status(frame, Err(err)),
        };

        let msg = Message {
            info: msg_info(
                SFN_HANDLE_BASE + callee_idx,
                caller.client_id,
                &invec,
                desc.in_len,
                &outvec,
                desc.out_len,
                0,
            ),
            connection_slot: None,
            signal: 0,
        };
        let req = RequestArgs {
            invec,
            in_len: desc.in_len,
            outvec,
            out_len: desc.out_len,
            out_array_ptr: desc.out_vec,
            msg,
            init: false,
        };
        if let Err(err) = self.begin_request(callee_idx, req) {
            return Outcome::Fatal(err);
        }
        Outcome::Enter {
            partition_idx: callee_idx,
        }
    }

    pub(crate) fn svc_request_return(&mut self, args: [usize; 4]) -> Outcome {
        let status = args[0] as isize;
        let idx = self.running_idx;
        let partition = self.partitions.get(idx);
        if partition.state() != PartitionState::Running
            || partition.is_ipc()
            || is_builtin(partition.id())
        {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        match partition.runtime.msg {
            Some(msg) if msg.connection_slot.is_none() => {}
            _ => return Outcome::Fatal(Error::SecurityViolation),
        }
        match self.complete_request(status) {
            Ok(caller_idx) => Outcome::Return {
                partition_idx: caller_idx,
                status,
            },
            Err(err) => Outcome::Fatal(err),
        }
    }

    fn service_of(&self, partition_idx: usize, sid: u32) -> Option<ServiceConfig> {
        self.partitions
            .get(partition_idx)
            .config
            .services
            .iter()
            .find(|s| s.sid == sid)
            .copied()
    }

    /// Whether the target can take a request right now. `signal` is the
    /// service signal about to be asserted, for the wake-out-of-`wait`
    /// case.
    fn target_can_accept(&self, callee_idx: usize, sig: u32) -> Result<(), Error> {
        let target = self.partitions.get(callee_idx);
        match target.state() {
            PartitionState::Idle => Ok(()),
            PartitionState::Closed => Err(Error::ConnectionRefused),
            PartitionState::Suspended
                if target.runtime.msg.is_none() && target.runtime.waiting_mask & sig != 0 =>
            {
                Ok(())
            }
            _ => Err(Error::Busy),
        }
    }

    /// Copy the vector descriptors out of caller memory and validate each
    /// buffer. `InvalidParameter` marks a malformed descriptor (null or
    /// zero-length); `AccessDenied` marks a validator refusal and the
    /// caller never sees it as a status.
    fn load_iovecs(
        &self,
        caller: &CallerInfo,
        array_ptr: usize,
        count: usize,
        write: bool,
    ) -> Result<[IoVec; MAX_IOVEC], Error> {
        let mut vecs = [IoVec::default(); MAX_IOVEC];
        if count == 0 {
            return Ok(vecs);
        }
        if count > MAX_IOVEC || array_ptr == 0 {
            return Err(Error::InvalidParameter);
        }

        let array_bytes = count * core::mem::size_of::<IoVec>();
        if !self
            .memory
            .check(array_ptr, array_bytes, false, caller.is_ns, caller.privileged, Share::None)
        {
            return Err(Error::AccessDenied);
        }
        if write
            && !self
                .memory
                .check(array_ptr, array_bytes, true, caller.is_ns, caller.privileged, Share::None)
        {
            // the bytes-written counts are stored back here at reply time
            return Err(Error::AccessDenied);
        }

        for (i, vec) in vecs.iter_mut().enumerate().take(count) {
            let v: IoVec = unsafe { mem_read(array_ptr + i * core::mem::size_of::<IoVec>()) };
            if v.base == 0 || v.len == 0 {
                return Err(Error::InvalidParameter);
            }
            if !self
                .memory
                .check(v.base, v.len, write, caller.is_ns, caller.privileged, Share::None)
            {
                return Err(Error::AccessDenied);
            }
            *vec = v;
        }
        Ok(vecs)
    }
}

fn msg_info(
    handle: usize,
    client_id: i32,
    invec: &[IoVec; MAX_IOVEC],
    in_len: usize,
    outvec: &[IoVec; MAX_IOVEC],
    out_len: usize,
    rhandle: usize,
) -> MsgInfo {
    let mut info = MsgInfo {
        handle,
        client_id,
        rhandle,
        ..Default::default()
    };
    for i in 0..in_len {
        info.in_size[i] = invec[i].len;
    }
    for i in 0..out_len {
        info.out_size[i] = outvec[i].len;
    }
    info
}
