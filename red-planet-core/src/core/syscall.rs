//! Optional newlib/proxy-kernel-style syscall emulation, used when `ECALL` is intercepted rather
//! than trapping to the guest's own exception handler (see [`Config::syscall_intercept`]).
//!
//! The calling convention mirrors the one used by `riscv-pk`/newlib: `a7` holds the syscall
//! number, `a0`..`a3` hold up to four arguments, and the (signed) return value is written back
//! into `a0`. Paths and buffers are read from/written to guest memory through the core's own MMU,
//! so the access still goes through the usual translation/permission checks.
//!
//! [`Config::syscall_intercept`]: super::Config

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::registers::Specifier;
use crate::system_bus::SystemBus;
use crate::Allocator;

use super::Core;

pub const SYS_GETCWD: u32 = 17;
pub const SYS_FCNTL: u32 = 25;
pub const SYS_LSEEK: u32 = 62;
pub const SYS_READ: u32 = 63;
pub const SYS_WRITE: u32 = 64;
pub const SYS_FSTAT: u32 = 80;
pub const SYS_EXIT: u32 = 93;
pub const SYS_GETTIMEOFDAY: u32 = 169;
pub const SYS_BRK: u32 = 214;
pub const SYS_OPEN: u32 = 1024;
pub const SYS_CLOSE: u32 = 57;
/// The standard `exit_group` number, treated identically to [`SYS_EXIT`] since this core only ever
/// runs a single thread.
pub const SYS_EXIT_GROUP: u32 = 94;
/// Not part of the standard Linux/newlib syscall table (there is no dedicated `time` syscall on
/// RISC-V Linux, since `gettimeofday` subsumes it); this VP reserves a number outside of the
/// generic syscall range for it, following the same convention `riscv-pk` uses for its
/// `getmainvars` extension.
pub const SYS_TIME: u32 = 2012;

/// Host-indication syscalls: simulator-specific extensions with no Linux/newlib equivalent, used
/// by bare-metal test harnesses to talk to the host without a filesystem.
pub const HOST_PUTCHAR: u32 = 0xFF00;
pub const HOST_REPORT_PASS: u32 = 0xFF01;
pub const HOST_REPORT_FAIL: u32 = 0xFF02;

const EBADF: i32 = -9;
const ENOENT: i32 = -2;
const EIO: i32 = -5;

/// Host-side state backing the syscall emulation: the table of guest file descriptors that have
/// been `open`ed against real host files, and the simulated program break.
///
/// This is explicitly *not* part of the snapshotted simulation state (see
/// [`space_time::allocator::Allocator`]): open host file handles cannot be meaningfully
/// rewound, same as the ELF loader or GDB stub this core treats as external collaborators.
#[derive(Debug)]
pub struct HostIo {
    files: HashMap<i32, File>,
    next_fd: i32,
    brk: u32,
}

impl HostIo {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            // fd 0/1/2 are reserved for stdin/stdout/stderr, which this emulation forwards to the
            // host's own standard streams rather than tracking as `File`s.
            next_fd: 3,
            brk: 0,
        }
    }
}

/// Outcome of handling one intercepted `ECALL`.
pub struct SyscallOutcome {
    /// Value to write back into `a0`.
    pub return_value: u32,
    /// `Some(code)` if the guest requested the simulation to stop, carrying its exit code.
    pub exit_code: Option<i32>,
}

impl SyscallOutcome {
    fn value(return_value: u32) -> Self {
        Self {
            return_value,
            exit_code: None,
        }
    }

    fn error(errno: i32) -> Self {
        Self {
            return_value: errno as u32,
            exit_code: None,
        }
    }

    fn exit(code: i32) -> Self {
        Self {
            return_value: code as u32,
            exit_code: Some(code),
        }
    }
}

/// Reads a NUL-terminated string starting at `address` out of guest memory.
fn read_cstr<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    mut address: u32,
) -> Result<String, ()> {
    let mmu = core.mmu();
    let mut bytes = Vec::new();
    loop {
        let byte = mmu.read_byte(allocator, address).map_err(|_| ())?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        address = address.wrapping_add(1);
        if bytes.len() > 4096 {
            // Guard against a guest bug turning this into an unbounded host-side allocation.
            return Err(());
        }
    }
    String::from_utf8(bytes).map_err(|_| ())
}

fn read_buf<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    address: u32,
    len: usize,
) -> Result<Vec<u8>, ()> {
    let mmu = core.mmu();
    let mut buf = Vec::with_capacity(len);
    for i in 0..len as u32 {
        buf.push(
            mmu.read_byte(allocator, address.wrapping_add(i))
                .map_err(|_| ())?,
        );
    }
    Ok(buf)
}

fn write_buf<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    address: u32,
    data: &[u8],
) -> Result<(), ()> {
    let mmu = core.mmu();
    for (i, &byte) in data.iter().enumerate() {
        mmu.write_byte(allocator, address.wrapping_add(i as u32), byte)
            .map_err(|_| ())?;
    }
    Ok(())
}

fn write_u32<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    address: u32,
    value: u32,
) -> Result<(), ()> {
    core.mmu()
        .write_word(allocator, address, value)
        .map_err(|_| ())
}

/// Handles one `ECALL` intercepted as a host syscall. Reads `a7`/`a0`..`a3` out of `core`'s
/// registers and returns the result to be written into `a0`.
pub fn execute_syscall<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    host: &RefCell<HostIo>,
) -> SyscallOutcome {
    let registers = core.registers(allocator);
    let number = registers.x(Specifier::from_u5(17)); // a7
    let a0 = registers.x(Specifier::from_u5(10));
    let a1 = registers.x(Specifier::from_u5(11));
    let a2 = registers.x(Specifier::from_u5(12));
    let _a3 = registers.x(Specifier::from_u5(13));

    match number {
        SYS_EXIT | SYS_EXIT_GROUP => SyscallOutcome::exit(a0 as i32),
        SYS_WRITE => sys_write(core, allocator, host, a0 as i32, a1, a2 as usize),
        SYS_READ => sys_read(core, allocator, host, a0 as i32, a1, a2 as usize),
        SYS_OPEN => sys_open(core, allocator, host, a0, a1),
        SYS_CLOSE => sys_close(host, a0 as i32),
        SYS_LSEEK => sys_lseek(host, a0 as i32, a1 as i32, a2),
        SYS_FSTAT => sys_fstat(core, allocator, a0 as i32, a1),
        SYS_BRK => sys_brk(host, a0),
        SYS_GETTIMEOFDAY => sys_gettimeofday(core, allocator, a0),
        SYS_TIME => sys_time(core, allocator, a0),
        HOST_PUTCHAR => {
            print!("{}", a0 as u8 as char);
            SyscallOutcome::value(0)
        }
        HOST_REPORT_PASS => SyscallOutcome::exit(0),
        HOST_REPORT_FAIL => SyscallOutcome::exit(if a0 == 0 { 1 } else { a0 as i32 }),
        _ => SyscallOutcome::error(-38 /* ENOSYS */),
    }
}

fn sys_write<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    host: &RefCell<HostIo>,
    fd: i32,
    buf_addr: u32,
    len: usize,
) -> SyscallOutcome {
    let Ok(data) = read_buf(core, allocator, buf_addr, len) else {
        return SyscallOutcome::error(EIO);
    };
    let written = match fd {
        1 => std::io::stdout().write_all(&data).map(|()| data.len()),
        2 => std::io::stderr().write_all(&data).map(|()| data.len()),
        fd => {
            let mut host = host.borrow_mut();
            match host.files.get_mut(&fd) {
                Some(file) => file.write_all(&data).map(|()| data.len()),
                None => return SyscallOutcome::error(EBADF),
            }
        }
    };
    match written {
        Ok(n) => SyscallOutcome::value(n as u32),
        Err(_) => SyscallOutcome::error(EIO),
    }
}

fn sys_read<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    host: &RefCell<HostIo>,
    fd: i32,
    buf_addr: u32,
    len: usize,
) -> SyscallOutcome {
    let mut data = vec![0u8; len];
    let read = match fd {
        0 => std::io::stdin().read(&mut data),
        fd => {
            let mut host = host.borrow_mut();
            match host.files.get_mut(&fd) {
                Some(file) => file.read(&mut data),
                None => return SyscallOutcome::error(EBADF),
            }
        }
    };
    let n = match read {
        Ok(n) => n,
        Err(_) => return SyscallOutcome::error(EIO),
    };
    if write_buf(core, allocator, buf_addr, &data[..n]).is_err() {
        return SyscallOutcome::error(EIO);
    }
    SyscallOutcome::value(n as u32)
}

fn sys_open<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    host: &RefCell<HostIo>,
    path_addr: u32,
    flags: u32,
) -> SyscallOutcome {
    let Ok(path) = read_cstr(core, allocator, path_addr) else {
        return SyscallOutcome::error(EIO);
    };
    // Matches newlib's fcntl.h: O_WRONLY=1, O_RDWR=2, O_CREAT=0x200, O_TRUNC=0x400, O_APPEND=0x8.
    let mut options = OpenOptions::new();
    options.read(flags & 0x3 != 1);
    options.write(flags & 0x3 != 0);
    options.create(flags & 0x200 != 0);
    options.truncate(flags & 0x400 != 0);
    options.append(flags & 0x8 != 0);
    match options.open(&path) {
        Ok(file) => {
            let mut host = host.borrow_mut();
            let fd = host.next_fd;
            host.next_fd += 1;
            host.files.insert(fd, file);
            SyscallOutcome::value(fd as u32)
        }
        Err(_) => SyscallOutcome::error(ENOENT),
    }
}

fn sys_close(host: &RefCell<HostIo>, fd: i32) -> SyscallOutcome {
    if matches!(fd, 0 | 1 | 2) {
        return SyscallOutcome::value(0);
    }
    match host.borrow_mut().files.remove(&fd) {
        Some(_) => SyscallOutcome::value(0),
        None => SyscallOutcome::error(EBADF),
    }
}

fn sys_lseek(host: &RefCell<HostIo>, fd: i32, offset: i32, whence: u32) -> SyscallOutcome {
    let seek_from = match whence {
        0 => SeekFrom::Start(offset as u64),
        1 => SeekFrom::Current(offset as i64),
        2 => SeekFrom::End(offset as i64),
        _ => return SyscallOutcome::error(-22 /* EINVAL */),
    };
    let mut host = host.borrow_mut();
    match host.files.get_mut(&fd) {
        Some(file) => match file.seek(seek_from) {
            Ok(pos) => SyscallOutcome::value(pos as u32),
            Err(_) => SyscallOutcome::error(EIO),
        },
        None => SyscallOutcome::error(EBADF),
    }
}

/// Populates enough of newlib's `struct stat` for `isatty`-style probing to succeed: only the
/// `st_mode` field (offset 16 on the riscv32 newlib ABI) is written, tagged as a character device
/// for the standard streams and as a regular file otherwise. The rest of the (zero-initialized by
/// the guest) structure is left untouched.
fn sys_fstat<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    fd: i32,
    stat_addr: u32,
) -> SyscallOutcome {
    const S_IFCHR: u32 = 0o020000;
    const S_IFREG: u32 = 0o100000;
    let st_mode = if matches!(fd, 0 | 1 | 2) {
        S_IFCHR
    } else {
        S_IFREG
    };
    match write_u32(core, allocator, stat_addr.wrapping_add(16), st_mode) {
        Ok(()) => SyscallOutcome::value(0),
        Err(()) => SyscallOutcome::error(EIO),
    }
}

fn sys_brk(host: &RefCell<HostIo>, requested: u32) -> SyscallOutcome {
    let mut host = host.borrow_mut();
    if requested != 0 {
        host.brk = requested;
    }
    SyscallOutcome::value(host.brk)
}

fn sys_gettimeofday<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    timeval_addr: u32,
) -> SyscallOutcome {
    if timeval_addr == 0 {
        return SyscallOutcome::value(0);
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let write_result = write_u32(core, allocator, timeval_addr, now.as_secs() as u32).and_then(
        |()| write_u32(core, allocator, timeval_addr.wrapping_add(4), now.subsec_micros()),
    );
    match write_result {
        Ok(()) => SyscallOutcome::value(0),
        Err(()) => SyscallOutcome::error(EIO),
    }
}

fn sys_time<A: Allocator, B: SystemBus<A>>(
    core: &Core<A, B>,
    allocator: &mut A,
    out_addr: u32,
) -> SyscallOutcome {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    if out_addr != 0 && write_u32(core, allocator, out_addr, now).is_err() {
        return SyscallOutcome::error(EIO);
    }
    SyscallOutcome::value(now)
}
