//! Per-opcode argument/return word counts, checked before dispatch.

use crate::svc;

#[derive(Default, Copy, Clone)]
pub struct Constraint {
    pub cmd: usize,
    pub arg_num: usize,
    pub ret_num: usize,
}

impl Constraint {
    pub fn new(cmd: usize, arg_num: usize, ret_num: usize) -> Constraint {
        Constraint {
            cmd,
            arg_num,
            ret_num,
        }
    }
}

pub fn pick(cmd: usize) -> Option<Constraint> {
    let constraint = match cmd {
        svc::VERSION => Constraint::new(svc::VERSION, 0, 1),
        svc::SERVICE_VERSION => Constraint::new(svc::SERVICE_VERSION, 1, 1),
        svc::CONNECT => Constraint::new(svc::CONNECT, 2, 1),
        svc::CALL => Constraint::new(svc::CALL, 4, 1),
        svc::CLOSE => Constraint::new(svc::CLOSE, 1, 1),
        svc::WAIT => Constraint::new(svc::WAIT, 2, 1),
        svc::GET => Constraint::new(svc::GET, 2, 1),
        svc::SET_RHANDLE => Constraint::new(svc::SET_RHANDLE, 2, 1),
        svc::READ => Constraint::new(svc::READ, 4, 1),
        svc::SKIP => Constraint::new(svc::SKIP, 3, 1),
        svc::WRITE => Constraint::new(svc::WRITE, 4, 1),
        svc::REPLY => Constraint::new(svc::REPLY, 2, 1),
        svc::NOTIFY => Constraint::new(svc::NOTIFY, 1, 1),
        svc::CLEAR => Constraint::new(svc::CLEAR, 0, 1),
        svc::EOI => Constraint::new(svc::EOI, 1, 1),
        svc::REQUEST => Constraint::new(svc::REQUEST, 1, 1),
        svc::REQUEST_RETURN => Constraint::new(svc::REQUEST_RETURN, 1, 1),
        svc::VALIDATE_SECURE_CALLER => Constraint::new(svc::VALIDATE_SECURE_CALLER, 0, 1),
        svc::GET_CALLER_CLIENT_ID => Constraint::new(svc::GET_CALLER_CLIENT_ID, 1, 1),
        svc::MEMORY_CHECK => Constraint::new(svc::MEMORY_CHECK, 3, 1),
        svc::SET_SHARE_AREA => Constraint::new(svc::SET_SHARE_AREA, 1, 1),
        svc::GET_BOOT_DATA => Constraint::new(svc::GET_BOOT_DATA, 3, 1),
        svc::OUTPUT_LOG => Constraint::new(svc::OUTPUT_LOG, 2, 1),
        _ => return None,
    };
    Some(constraint)
}
