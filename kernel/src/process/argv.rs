/*!
 * Argument Vectors
 *
 * Staging of exec arguments: copied out of the old image into kernel memory,
 * then written onto the new program's stack.
 *
 * # Stack layout
 *
 * ```text
 *   USERSTACK ->  +---------------------------+
 *                 | argv[argc-1] bytes, NUL,  |  each string padded to 4 bytes,
 *                 | ...                       |  last argument highest
 *                 | argv[0] bytes, NUL, pad   |
 *                 +---------------------------+  aligned down to 8
 *                 | pad (when argc is even)   |
 *                 | NULL                      |
 *                 | argv[argc-1] pointer      |
 *                 | ...                       |
 *   sp = argv ->  | argv[0] pointer           |  8-aligned
 *                 +---------------------------+
 * ```
 */

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{ARG_MAX, MAX_ARGC, STACK_ALIGN, STRING_ALIGN, USER_PTR_SIZE};
use crate::core::types::Address;
use crate::memory::{copyin_word, copyinstr, AddressSpace};

/// Where the marshaled arguments ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgvLayout {
    pub argc: usize,
    pub argv: Address,
    pub sp: Address,
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[inline]
const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Copy a NULL-terminated user argv array into kernel memory
///
/// The argument block (strings, terminators and pointer slots including the
/// NULL) may not exceed `ARG_MAX` bytes nor `MAX_ARGC` entries.
pub fn copyin_args(space: &AddressSpace, argv: Address) -> ProcessResult<Vec<Vec<u8>>> {
    let mut args: Vec<Vec<u8>> = Vec::new();
    let mut total = 0usize;

    loop {
        let slot = argv
            .checked_add(args.len() * USER_PTR_SIZE)
            .ok_or(ProcessError::Fault(argv))?;
        let ptr = copyin_word(space, slot)? as Address;
        total += USER_PTR_SIZE;
        if ptr == 0 {
            break;
        }
        if args.len() == MAX_ARGC {
            return Err(ProcessError::ArgumentListTooLong {
                size: total,
                limit: ARG_MAX,
            });
        }

        let arg = copyinstr(space, ptr, ARG_MAX)?;
        total += arg.len() + 1;
        if total > ARG_MAX {
            return Err(ProcessError::ArgumentListTooLong {
                size: total,
                limit: ARG_MAX,
            });
        }
        args.push(arg);
    }

    Ok(args)
}

/// Bytes of stack `marshal` uses for `args` below a page-aligned top
pub fn stack_bytes(args: &[Vec<u8>]) -> usize {
    let strings: usize = args
        .iter()
        .map(|arg| align_up(arg.len() + 1, STRING_ALIGN))
        .sum();
    align_up(strings, STACK_ALIGN) + align_up((args.len() + 1) * USER_PTR_SIZE, STACK_ALIGN)
}

/// Fail with E2BIG unless `args` fit a stack of `stack_size` bytes
pub fn check_fits(args: &[Vec<u8>], stack_size: usize) -> ProcessResult<()> {
    let size = stack_bytes(args);
    if size > stack_size {
        return Err(ProcessError::ArgumentListTooLong {
            size,
            limit: stack_size,
        });
    }
    Ok(())
}

/// Write `args` below `stack_top` in the layout the user-mode entry expects
pub fn marshal(space: &mut AddressSpace, stack_top: Address, args: &[Vec<u8>]) -> ProcessResult<ArgvLayout> {
    let overflow = || ProcessError::Fault(stack_top);
    let mut sp = stack_top;
    let mut pointers = vec![0u32; args.len() + 1];

    for (i, arg) in args.iter().enumerate().rev() {
        let padded = align_up(arg.len() + 1, STRING_ALIGN);
        sp = sp.checked_sub(padded).ok_or_else(overflow)?;

        let mut bytes = Vec::with_capacity(padded);
        bytes.extend_from_slice(arg);
        bytes.resize(padded, 0);
        space.write(sp, &bytes)?;
        pointers[i] = sp as u32;
    }

    let table_len = align_up(pointers.len() * USER_PTR_SIZE, STACK_ALIGN);
    sp = align_down(sp, STACK_ALIGN)
        .checked_sub(table_len)
        .ok_or_else(overflow)?;

    let table: Vec<u8> = pointers.iter().flat_map(|p| p.to_le_bytes()).collect();
    space.write(sp, &table)?;

    Ok(ArgvLayout {
        argc: args.len(),
        argv: sp,
        sp,
    })
}
