//! Allocation-flags (`gfp_t`) decomposition
//!
//! Composite masks come first so that e.g. `0x14c0` reads as `GFP_KERNEL`
//! instead of its five component bits.

const DMA: u64 = 0x01;
const HIGHMEM: u64 = 0x02;
const DMA32: u64 = 0x04;
const MOVABLE: u64 = 0x08;
const RECLAIMABLE: u64 = 0x10;
const HIGH: u64 = 0x20;
const IO: u64 = 0x40;
const FS: u64 = 0x80;
const ZERO: u64 = 0x100;
const ATOMIC: u64 = 0x200;
const DIRECT_RECLAIM: u64 = 0x400;
const WRITE: u64 = 0x800;
const KSWAPD_RECLAIM: u64 = 0x1000;
const NOWARN: u64 = 0x2000;
const RETRY_MAYFAIL: u64 = 0x4000;
const NOFAIL: u64 = 0x8000;
const NORETRY: u64 = 0x10000;
const MEMALLOC: u64 = 0x20000;
const COMP: u64 = 0x40000;
const NOMEMALLOC: u64 = 0x80000;
const HARDWALL: u64 = 0x100000;
const THISNODE: u64 = 0x200000;
const ACCOUNT: u64 = 0x400000;

const RECLAIM: u64 = DIRECT_RECLAIM | KSWAPD_RECLAIM;
const GFP_ATOMIC: u64 = HIGH | ATOMIC | KSWAPD_RECLAIM;
const GFP_KERNEL: u64 = RECLAIM | IO | FS;
const GFP_KERNEL_ACCOUNT: u64 = GFP_KERNEL | ACCOUNT;
const GFP_NOWAIT: u64 = KSWAPD_RECLAIM;
const GFP_NOIO: u64 = RECLAIM;
const GFP_NOFS: u64 = RECLAIM | IO;
const GFP_USER: u64 = RECLAIM | IO | FS | HARDWALL;
const GFP_HIGHUSER: u64 = GFP_USER | HIGHMEM;
const GFP_HIGHUSER_MOVABLE: u64 = GFP_HIGHUSER | MOVABLE;
const GFP_TRANSHUGE_LIGHT: u64 = (GFP_HIGHUSER_MOVABLE | COMP | NOMEMALLOC | NOWARN) & !RECLAIM;
const GFP_TRANSHUGE: u64 = GFP_TRANSHUGE_LIGHT | DIRECT_RECLAIM;

/// Named masks in decomposition order
pub const GFP_FLAG_NAMES: &[(u64, &str)] = &[
    (GFP_TRANSHUGE, "GFP_TRANSHUGE"),
    (GFP_TRANSHUGE_LIGHT, "GFP_TRANSHUGE_LIGHT"),
    (GFP_HIGHUSER_MOVABLE, "GFP_HIGHUSER_MOVABLE"),
    (GFP_HIGHUSER, "GFP_HIGHUSER"),
    (GFP_USER, "GFP_USER"),
    (GFP_KERNEL_ACCOUNT, "GFP_KERNEL_ACCOUNT"),
    (GFP_KERNEL, "GFP_KERNEL"),
    (GFP_NOFS, "GFP_NOFS"),
    (GFP_ATOMIC, "GFP_ATOMIC"),
    (GFP_NOIO, "GFP_NOIO"),
    (GFP_NOWAIT, "GFP_NOWAIT"),
    (DMA, "GFP_DMA"),
    (HIGHMEM, "__GFP_HIGHMEM"),
    (DMA32, "GFP_DMA32"),
    (HIGH, "__GFP_HIGH"),
    (ATOMIC, "__GFP_ATOMIC"),
    (IO, "__GFP_IO"),
    (FS, "__GFP_FS"),
    (NOWARN, "__GFP_NOWARN"),
    (RETRY_MAYFAIL, "__GFP_RETRY_MAYFAIL"),
    (NOFAIL, "__GFP_NOFAIL"),
    (NORETRY, "__GFP_NORETRY"),
    (COMP, "__GFP_COMP"),
    (ZERO, "__GFP_ZERO"),
    (NOMEMALLOC, "__GFP_NOMEMALLOC"),
    (MEMALLOC, "__GFP_MEMALLOC"),
    (HARDWALL, "__GFP_HARDWALL"),
    (THISNODE, "__GFP_THISNODE"),
    (RECLAIMABLE, "__GFP_RECLAIMABLE"),
    (MOVABLE, "__GFP_MOVABLE"),
    (ACCOUNT, "__GFP_ACCOUNT"),
    (WRITE, "__GFP_WRITE"),
    (RECLAIM, "__GFP_RECLAIM"),
    (DIRECT_RECLAIM, "__GFP_DIRECT_RECLAIM"),
    (KSWAPD_RECLAIM, "__GFP_KSWAPD_RECLAIM"),
];

/// Split `value` into the names of the masks it contains
///
/// Each matched mask's bits are cleared before continuing, so every bit is
/// named at most once. Bits matching no entry are reported as one trailing
/// hex value.
pub fn decompose(value: u64) -> Vec<String> {
    let mut rest = value;
    let mut names = Vec::new();

    for &(mask, name) in GFP_FLAG_NAMES {
        if rest & mask == mask && rest != 0 {
            rest &= !mask;
            names.push(name.to_string());
        }
    }

    if rest != 0 {
        names.push(format!("{rest:#x}"));
    }
    names
}

/// `|`-joined decomposition, empty for zero
pub fn render(value: u64) -> String {
    decompose(value).join("|")
}
