/*!
 * User/Kernel Copy Primitives
 *
 * Every transfer between kernel memory and a user pointer goes through these
 * functions so that bad pointers surface as `EFAULT` instead of touching
 * memory the process does not own.
 */

use super::address_space::AddressSpace;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::USER_PTR_SIZE;
use crate::core::types::Address;

/// Copy `buf.len()` bytes from user address `src`
pub fn copyin(space: &AddressSpace, src: Address, buf: &mut [u8]) -> ProcessResult<()> {
    space.read(src, buf).map_err(ProcessError::from)
}

/// Copy `bytes` to user address `dst`
pub fn copyout(space: &mut AddressSpace, dst: Address, bytes: &[u8]) -> ProcessResult<()> {
    space.write(dst, bytes).map_err(ProcessError::from)
}

/// Read one 32-bit little-endian user word (a user pointer or int)
pub fn copyin_word(space: &AddressSpace, src: Address) -> ProcessResult<u32> {
    let mut word = [0u8; USER_PTR_SIZE];
    copyin(space, src, &mut word)?;
    Ok(u32::from_le_bytes(word))
}

/// Write one 32-bit little-endian user word
pub fn copyout_word(space: &mut AddressSpace, dst: Address, value: u32) -> ProcessResult<()> {
    copyout(space, dst, &value.to_le_bytes())
}

/// Copy a NUL-terminated string of at most `max` bytes (NUL included)
///
/// Returns the bytes without the terminator. A string that does not end within
/// `max` bytes is `NameTooLong`; running off mapped memory first is `Fault`.
pub fn copyinstr(space: &AddressSpace, src: Address, max: usize) -> ProcessResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    for offset in 0..max {
        let addr = src
            .checked_add(offset)
            .ok_or(ProcessError::Fault(src))?;
        space.read(addr, &mut byte)?;
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0]);
    }
    Err(ProcessError::NameTooLong { limit: max })
}
