//! Service-facing operations: what a running partition uses to pull a
//! request apart, move bytes across the boundary, and hand the result
//! back. Misuse on this side never gets a status code; a partition
//! holding a falsified contract is halted.

use crate::call::{mem_copy, mem_write};
use crate::dispatch::{ret_status, Outcome, TrapFrame};
use crate::error::Error;
use crate::partition::state::PartitionState;
use crate::partition::{signal, Message};
use crate::svc;
use crate::svc::client::is_builtin;
use crate::Spm;

impl Spm {
    /// The running user partition, or the violation to report.
    fn running_service(&self) -> Result<usize, Error> {
        let idx = self.running_idx;
        let partition = self.partitions.get(idx);
        if partition.state() != PartitionState::Running || is_builtin(partition.id()) {
            return Err(Error::SecurityViolation);
        }
        Ok(idx)
    }

    fn current_msg(&self, msg_handle: usize) -> Result<(usize, Message), Error> {
        let idx = self.running_service()?;
        match self.partitions.get(idx).runtime.msg {
            Some(msg) if msg.info.handle == msg_handle => Ok((idx, msg)),
            _ => Err(Error::SecurityViolation),
        }
    }

    pub(crate) fn svc_wait(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let mask = args[0] as u32;
        let timeout = args[1];

        let idx = match self.running_service() {
            Ok(idx) => idx,
            Err(err) => return Outcome::Fatal(err),
        };
        if !self.partitions.get(idx).is_ipc() || mask == 0 {
            return Outcome::Fatal(Error::SecurityViolation);
        }

        let asserted = self.partitions.get(idx).runtime.signals & mask;
        if asserted != 0 || timeout == svc::TIMEOUT_POLL {
            frame.r[0] = asserted as usize;
            return Outcome::Resume;
        }

        let partition = self.partitions.get_mut(idx);
        partition.runtime.state = PartitionState::Suspended;
        partition.runtime.waiting_mask = mask;
        Outcome::Suspend { partition_idx: idx }
    }

    pub(crate) fn svc_get(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let sig = args[0] as u32;
        let msg_ptr = args[1];

        let idx = match self.running_service() {
            Ok(idx) => idx,
            Err(err) => return Outcome::Fatal(err),
        };
        let partition = self.partitions.get(idx);
        if !partition.is_ipc() || sig.count_ones() != 1 {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        if partition.runtime.signals & sig == 0 {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        let msg = match partition.runtime.msg {
            Some(msg) if msg.signal == sig => msg,
            _ => return Outcome::Fatal(Error::SecurityViolation),
        };

        if !self.partition_can_write(idx, msg_ptr, core::mem::size_of::<crate::partition::MsgInfo>())
        {
            return Outcome::Fatal(Error::AccessDenied);
        }
        unsafe { mem_write(msg_ptr, msg.info) };
        self.partitions.get_mut(idx).runtime.signals &= !sig;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_set_rhandle(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let msg_handle = args[0];
        let rhandle = args[1];

        let (idx, msg) = match self.current_msg(msg_handle) {
            Ok(found) => found,
            Err(err) => return Outcome::Fatal(err),
        };
        let slot = match msg.connection_slot {
            Some(slot) => slot,
            // reverse handles only live on connections
            None => return Outcome::Fatal(Error::SecurityViolation),
        };
        match self
            .connections
            .lookup_mut(crate::connection::handle_of(slot))
        {
            Some(conn) => conn.rhandle = rhandle,
            None => return Outcome::Fatal(Error::SecurityViolation),
        }
        if let Some(msg) = self.partitions.get_mut(idx).runtime.msg.as_mut() {
            msg.info.rhandle = rhandle;
        }
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_read(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let msg_handle = args[0];
        let vec_idx = args[1];
        let buf = args[2];
        let len = args[3];

        let (idx, _) = match self.current_msg(msg_handle) {
            Ok(found) => found,
            Err(err) => return Outcome::Fatal(err),
        };
        let rt = &self.partitions.get(idx).runtime;
        if vec_idx >= rt.in_len {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        let remaining = rt.invec[vec_idx].len - rt.in_consumed[vec_idx];
        let n = len.min(remaining);
        if n > 0 {
            if !self.partition_can_write(idx, buf, n) {
                return Outcome::Fatal(Error::AccessDenied);
            }
            let rt = &self.partitions.get(idx).runtime;
            unsafe { mem_copy(rt.invec[vec_idx].base + rt.in_consumed[vec_idx], buf, n) };
        }
        self.partitions.get_mut(idx).runtime.in_consumed[vec_idx] += n;
        ret_status(frame, Ok(n))
    }

    pub(crate) fn svc_skip(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let msg_handle = args[0];
        let vec_idx = args[1];
        let len = args[2];

        let (idx, _) = match self.current_msg(msg_handle) {
            Ok(found) => found,
            Err(err) => return Outcome::Fatal(err),
        };
        let rt = &self.partitions.get(idx).runtime;
        if vec_idx >= rt.in_len {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        let remaining = rt.invec[vec_idx].len - rt.in_consumed[vec_idx];
        let n = len.min(remaining);
        self.partitions.get_mut(idx).runtime.in_consumed[vec_idx] += n;
        ret_status(frame, Ok(n))
    }

    pub(crate) fn svc_write(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let msg_handle = args[0];
        let vec_idx = args[1];
        let buf = args[2];
        let len = args[3];

        let (idx, _) = match self.current_msg(msg_handle) {
            Ok(found) => found,
            Err(err) => return Outcome::Fatal(err),
        };
        let rt = &self.partitions.get(idx).runtime;
        if vec_idx >= rt.out_len {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        let remaining = rt.outvec[vec_idx].len - rt.out_written[vec_idx];
        if len > remaining {
            // overrunning the client's buffer is an attack, not an error
            return Outcome::Fatal(Error::SecurityViolation);
        }
        if len > 0 {
            if !self.partition_can_read(idx, buf, len) {
                return Outcome::Fatal(Error::AccessDenied);
            }
            let rt = &self.partitions.get(idx).runtime;
            unsafe { mem_copy(buf, rt.outvec[vec_idx].base + rt.out_written[vec_idx], len) };
        }
        self.partitions.get_mut(idx).runtime.out_written[vec_idx] += len;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_reply(&mut self, args: [usize; 4]) -> Outcome {
        let msg_handle = args[0];
        let status = args[1] as isize;

        let (idx, msg) = match self.current_msg(msg_handle) {
            Ok(found) => found,
            Err(err) => return Outcome::Fatal(err),
        };
        if !self.partitions.get(idx).is_ipc() || msg.connection_slot.is_none() {
            // function-model requests return through REQUEST_RETURN
            return Outcome::Fatal(Error::SecurityViolation);
        }
        match self.complete_request(status) {
            Ok(caller_idx) => Outcome::Return {
                partition_idx: caller_idx,
                status,
            },
            Err(err) => Outcome::Fatal(err),
        }
    }

    pub(crate) fn svc_notify(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let partition_id = args[0] as u32;
        let idx = match self.partitions.find_index(partition_id) {
            Some(idx) => idx,
            None => return Outcome::Fatal(Error::SecurityViolation),
        };
        if !self.partitions.get(idx).is_ipc() {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        self.partitions.get_mut(idx).runtime.signals |= signal::DOORBELL;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_clear(&mut self, frame: &mut TrapFrame) -> Outcome {
        let idx = match self.running_service() {
            Ok(idx) => idx,
            Err(err) => return Outcome::Fatal(err),
        };
        let partition = self.partitions.get_mut(idx);
        if partition.runtime.signals & signal::DOORBELL == 0 {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        partition.runtime.signals &= !signal::DOORBELL;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    pub(crate) fn svc_eoi(&mut self, args: [usize; 4], frame: &mut TrapFrame) -> Outcome {
        let sig = args[0] as u32;
        let idx = match self.running_service() {
            Ok(idx) => idx,
            Err(err) => return Outcome::Fatal(err),
        };
        let partition = self.partitions.get_mut(idx);
        if sig.count_ones() != 1
            || partition.config.irq_signals & sig == 0
            || partition.runtime.signals & sig == 0
        {
            return Outcome::Fatal(Error::SecurityViolation);
        }
        partition.runtime.signals &= !sig;
        ret_status(frame, Ok(svc::SUCCESS as usize))
    }

    /// Validator check for a buffer the running partition wants written.
    fn partition_can_write(&self, idx: usize, ptr: usize, len: usize) -> bool {
        if ptr == 0 {
            return false;
        }
        let partition = self.partitions.get(idx);
        self.memory.check(
            ptr,
            len,
            true,
            false,
            partition.is_psa_rot(),
            partition.runtime.share,
        )
    }

    /// Validator check for a buffer the running partition wants read.
    fn partition_can_read(&self, idx: usize, ptr: usize, len: usize) -> bool {
        if ptr == 0 {
            return false;
        }
        let partition = self.partitions.get(idx);
        self.memory.check(
            ptr,
            len,
            false,
            false,
            partition.is_psa_rot(),
            partition.runtime.share,
        )
    }
}

#[cfg(test)]
mod test {
    use crate::boot::NS_PARTITION_IDX;
    use crate::config::NS_CLIENT_ID_START;
    use crate::dispatch::Outcome;
    use crate::error::Error;
    use crate::partition::state::PartitionState;
    use crate::partition::{signal, IoVec, MsgInfo};
    use crate::svc;
    use crate::test_utils::*;
    use crate::Spm;

    /// Connect to the echo service and land a call carrying `data` in and
    /// an output window of `out_len` bytes. Returns the handle and the
    /// caller-side output state.
    fn enter_echo(
        spm: &mut Spm,
        data: &[u8],
        outbuf_ptr: usize,
        out_len: usize,
        outvecs: &mut [IoVec; 1],
    ) -> usize {
        let (out, frame) = svc(spm, svc::CONNECT, &[SID_ECHO as usize, 1]);
        assert_eq!(out, Outcome::Resume);
        let handle = frame.r[0];

        let invecs = [IoVec {
            base: addr_of(&data[0]),
            len: data.len(),
        }];
        outvecs[0] = IoVec {
            base: outbuf_ptr,
            len: out_len,
        };
        cover(spm, addr_of(&invecs), core::mem::size_of_val(&invecs));
        let outvecs_ptr = addr_of_mut(outvecs);
        cover(spm, outvecs_ptr, core::mem::size_of::<[IoVec; 1]>());
        cover(spm, addr_of(&data[0]), data.len());
        cover(spm, outbuf_ptr, out_len);

        let ipc = idx_of(spm, IPC_PARTITION_ID);
        let (out, _) = svc(
            spm,
            svc::CALL,
            &[
                handle,
                addr_of(&invecs),
                outvecs_ptr,
                svc::pack_vec_counts(1, 1),
            ],
        );
        assert_eq!(out, Outcome::Enter { partition_idx: ipc });
        handle
    }

    #[test]
    fn full_message_round_trip() {
        let mut spm = boot_basic();
        let ipc = idx_of(&spm, IPC_PARTITION_ID);

        let data = [1u8, 2, 3, 4, 5];
        let mut outbuf = [0u8; 8];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 8, &mut outvecs);

        assert_eq!(spm.partitions.get(ipc).state(), PartitionState::Running);
        assert_eq!(
            spm.partitions.get(NS_PARTITION_IDX).state(),
            PartitionState::Blocked
        );
        assert!(spm.in_secure_domain());

        // the service observes its signal and fetches the message
        let (out, frame) = svc(&mut spm, svc::WAIT, &[ECHO_SIGNAL as usize, svc::TIMEOUT_POLL]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0], ECHO_SIGNAL as usize);

        let mut info = MsgInfo::default();
        let info_ptr = addr_of_mut(&mut info);
        cover(&mut spm, info_ptr, core::mem::size_of::<MsgInfo>());
        let (out, frame) = svc(&mut spm, svc::GET, &[ECHO_SIGNAL as usize, info_ptr]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0] as isize, 0);
        assert_eq!(info.handle, handle);
        assert_eq!(info.client_id, NS_CLIENT_ID_START);
        assert_eq!(info.in_size[0], 5);
        assert_eq!(info.out_size[0], 8);

        // the signal was consumed by get
        let (_, frame) = svc(&mut spm, svc::WAIT, &[ECHO_SIGNAL as usize, svc::TIMEOUT_POLL]);
        assert_eq!(frame.r[0], 0);

        // drain the input in two reads
        let mut tmp = [0u8; 8];
        let tmp_ptr = addr_of_mut(&mut tmp);
        cover(&mut spm, tmp_ptr, 8);
        let (_, frame) = svc(&mut spm, svc::READ, &[handle, 0, tmp_ptr, 3]);
        assert_eq!(frame.r[0], 3);
        assert_eq!(&tmp[..3], &[1, 2, 3]);
        let (_, frame) = svc(&mut spm, svc::READ, &[handle, 0, tmp_ptr, 8]);
        assert_eq!(frame.r[0], 2);
        assert_eq!(&tmp[..2], &[4, 5]);

        let payload = [0x5au8, 0x5b, 0x5c, 0x5d];
        cover(&mut spm, addr_of(&payload), payload.len());
        let (_, frame) = svc(&mut spm, svc::WRITE, &[handle, 0, addr_of(&payload), 4]);
        assert_eq!(frame.r[0] as isize, 0);

        let (out, _) = svc(&mut spm, svc::REPLY, &[handle, 9]);
        assert_eq!(
            out,
            Outcome::Return {
                partition_idx: NS_PARTITION_IDX,
                status: 9
            }
        );
        assert_eq!(spm.partitions.get(ipc).state(), PartitionState::Idle);
        assert_eq!(
            spm.partitions.get(NS_PARTITION_IDX).state(),
            PartitionState::Running
        );
        assert!(!spm.in_secure_domain());
        assert_eq!(&outbuf[..4], &payload);
        assert_eq!(outvecs[0].len, 4);
    }

    #[test]
    fn skip_advances_the_read_cursor() {
        let mut spm = boot_basic();
        let data = [9u8, 8, 7, 6];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let (_, frame) = svc(&mut spm, svc::SKIP, &[handle, 0, 3]);
        assert_eq!(frame.r[0], 3);
        // over-length skip clamps to what is left
        let (_, frame) = svc(&mut spm, svc::SKIP, &[handle, 0, 100]);
        assert_eq!(frame.r[0], 1);
    }

    #[test]
    fn write_overrun_terminates_the_partition() {
        let mut spm = boot_basic();
        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let payload = [0u8; 8];
        cover(&mut spm, addr_of(&payload), payload.len());
        let (out, _) = svc(&mut spm, svc::WRITE, &[handle, 0, addr_of(&payload), 8]);
        assert_eq!(out, Outcome::Fatal(Error::SecurityViolation));
    }

    #[test]
    fn read_past_vector_count_terminates_the_partition() {
        let mut spm = boot_basic();
        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let mut tmp = [0u8; 4];
        let tmp_ptr = addr_of_mut(&mut tmp);
        cover(&mut spm, tmp_ptr, 4);
        let (out, _) = svc(&mut spm, svc::READ, &[handle, 3, tmp_ptr, 4]);
        assert_eq!(out, Outcome::Fatal(Error::SecurityViolation));
    }

    #[test]
    fn get_on_unasserted_signal_terminates_the_partition() {
        let mut spm = boot_basic();
        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let mut info = MsgInfo::default();
        let info_ptr = addr_of_mut(&mut info);
        cover(&mut spm, info_ptr, core::mem::size_of::<MsgInfo>());
        let wrong = (ECHO_SIGNAL << 1) as usize;
        let (out, _) = svc(&mut spm, svc::GET, &[wrong, info_ptr]);
        assert_eq!(out, Outcome::Fatal(Error::SecurityViolation));
    }

    #[test]
    fn set_rhandle_shows_up_in_later_messages() {
        let mut spm = boot_basic();
        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let (out, frame) = svc(&mut spm, svc::SET_RHANDLE, &[handle, 0xcafe]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0] as isize, 0);
        let (out, _) = svc(&mut spm, svc::REPLY, &[handle, 0]);
        assert!(matches!(out, Outcome::Return { .. }));

        // the next call on the same connection carries the reverse handle
        let data2 = [2u8];
        let ipc = idx_of(&spm, IPC_PARTITION_ID);
        let invecs = [IoVec {
            base: addr_of(&data2[0]),
            len: 1,
        }];
        cover(&mut spm, addr_of(&invecs), core::mem::size_of_val(&invecs));
        cover(&mut spm, addr_of(&data2[0]), 1);
        let (out, _) = svc(
            &mut spm,
            svc::CALL,
            &[handle, addr_of(&invecs), 0, svc::pack_vec_counts(1, 0)],
        );
        assert_eq!(out, Outcome::Enter { partition_idx: ipc });

        let mut info = MsgInfo::default();
        let info_ptr = addr_of_mut(&mut info);
        cover(&mut spm, info_ptr, core::mem::size_of::<MsgInfo>());
        let (out, _) = svc(&mut spm, svc::GET, &[ECHO_SIGNAL as usize, info_ptr]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(info.rhandle, 0xcafe);
    }

    #[test]
    fn blocking_wait_suspends_until_notify() {
        let mut spm = boot_basic();
        let ipc = idx_of(&spm, IPC_PARTITION_ID);
        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        let handle = enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        // nothing asserted on the doorbell: the partition parks
        let (out, _) = svc(
            &mut spm,
            svc::WAIT,
            &[signal::DOORBELL as usize, svc::TIMEOUT_BLOCK],
        );
        assert_eq!(out, Outcome::Suspend { partition_idx: ipc });
        assert_eq!(spm.partitions.get(ipc).state(), PartitionState::Suspended);

        assert_eq!(spm.resume_suspended(ipc), Err(Error::Busy));

        let (out, frame) = svc(&mut spm, svc::NOTIFY, &[IPC_PARTITION_ID as usize]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0] as isize, 0);

        assert_eq!(spm.resume_suspended(ipc), Ok(signal::DOORBELL));
        assert_eq!(spm.partitions.get(ipc).state(), PartitionState::Running);

        // the woken service finishes the request normally
        let (out, frame) = svc(&mut spm, svc::CLEAR, &[]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0] as isize, 0);
        let (out, _) = svc(&mut spm, svc::CLEAR, &[]);
        assert_eq!(out, Outcome::Fatal(Error::SecurityViolation));
        let (out, _) = svc(&mut spm, svc::REPLY, &[handle, 0]);
        assert!(matches!(out, Outcome::Return { .. }));
    }

    #[test]
    fn irq_post_and_eoi() {
        let mut spm = boot_basic();
        assert_eq!(
            spm.post_irq(IPC_PARTITION_ID, 1 << 26),
            Err(Error::InvalidParameter)
        );
        assert_eq!(spm.post_irq(IPC_PARTITION_ID, IPC_IRQ), Ok(()));
        assert_eq!(spm.post_irq(999, IPC_IRQ), Err(Error::NotFound));

        let data = [1u8];
        let mut outbuf = [0u8; 4];
        let outbuf_ptr = addr_of_mut(&mut outbuf);
        let mut outvecs = [IoVec::default()];
        enter_echo(&mut spm, &data, outbuf_ptr, 4, &mut outvecs);

        let (out, frame) = svc(&mut spm, svc::EOI, &[IPC_IRQ as usize]);
        assert_eq!(out, Outcome::Resume);
        assert_eq!(frame.r[0] as isize, 0);
        // already acknowledged
        let (out, _) = svc(&mut spm, svc::EOI, &[IPC_IRQ as usize]);
        assert_eq!(out, Outcome::Fatal(Error::SecurityViolation));
    }

    #[test]
    fn service_ops_from_the_non_secure_world_are_fatal() {
        let mut spm = boot_basic();
        for op in [svc::WAIT, svc::GET, svc::CLEAR, svc::EOI] {
            let (out, _) = svc(&mut spm, op, &[ECHO_SIGNAL as usize, 0]);
            assert_eq!(out, Outcome::Fatal(Error::SecurityViolation), "op {:#x}", op);
        }
    }
}
