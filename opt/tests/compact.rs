use std::str::FromStr;

use prjfabric_memory::{assert_isomorphic, Design};
use prjfabric_opt::compact;

fn compacted(mut design: Design) -> Design {
    compact(&mut design);
    design
}

#[test]
fn test_compact_moves_and_trims() {
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n",
        "  read #0 \"lo\" [ &0+4:4 ]\n",
        "  write #1 \"hi\" [ &0+8:4 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 04 05 06 07 08 09 0a 0b\n",
        "  read #0 \"lo\" [ &0+0:4 ]\n",
        "  write #1 \"hi\" [ &0+4:4 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_retargets_pointer_and_constant() {
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"head\" ptr $0:4 -> &1+4:2\n",
        "  read #0 \"fetch\" [ &0+0:4 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"tail\" bytes 10 11 12 13 14 15 16 17\n",
        "  const !0 -> &1+4:1\n",
        "  read #1 \"load\" [ &1+4:2 ] via [ $0 !0 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"head\" ptr $0:4 -> &1+0:2\n",
        "  read #0 \"fetch\" [ &0+0:4 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"tail\" bytes 14 15\n",
        "  const !0 -> &1+0:1\n",
        "  read #1 \"load\" [ &1+0:2 ] via [ $0 !0 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_retargets_gap_pointer() {
    // the pointer targets bytes inside the removed gap, so it is left aiming
    // at the start of the moved bytes
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03 04 05\n",
        "  read #0 \"r\" [ &0+4:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"ref\" ptr $0:4 -> &0+1:2\n",
        "  read #1 \"q\" [ &1+0:4 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 04 05\n",
        "  read #0 \"r\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"ref\" ptr $0:4 -> &0+0:2\n",
        "  read #1 \"q\" [ &1+0:4 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_respects_access_unit() {
    // "narrow" could move by one byte on its own, but one byte is not a
    // multiple of the widest access of the memory, so nothing moves; tails
    // are still trimmed
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"wide\" bytes 00 01 02 03 04 05 06 07\n",
        "  alloc &1 \"narrow\" bytes 08 09 0a 0b\n",
        "  read #0 \"w\" [ &0+4:4 ]\n",
        "  read #1 \"n\" [ &1+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"wide\" bytes 00 01 02 03 04 05 06 07\n",
        "  alloc &1 \"narrow\" bytes 08 09\n",
        "  read #0 \"w\" [ &0+4:4 ]\n",
        "  read #1 \"n\" [ &1+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_skips_implemented() {
    let source = concat!(
        "memory %0 fixed {\n",
        "  alloc &0 \"rom\" bytes 00 01 02 03\n",
        "  read #0 \"r\" [ &0+2:2 ]\n",
        "  port 0 ro { #0 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_blocked_by_pointer() {
    // the tail trim would cut away the second half of the pointer, so the
    // whole memory is left alone
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" { bytes 00 01 ptr $0:4 -> &0+0:2 }\n",
        "  read #0 \"r\" [ &0+2:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_blocked_by_tail_target() {
    // the stored pointer targets the byte the tail trim would remove, so the
    // whole memory is left alone
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"ref\" ptr $0:4 -> &0+3:1\n",
        "  read #1 \"q\" [ &1+0:4 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_leaves_unaccessed_allocations() {
    // nothing accesses "link", so it keeps all of its bytes; its pointer
    // still follows the moved "data" bytes
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"data\" bytes 00 01 02 03\n",
        "  alloc &1 \"link\" ptr $0:4 -> &0+0:2\n",
        "  read #0 \"r\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"link\" ptr $0:4 -> &1+0:2\n",
        "  alloc &1 \"data\" bytes 00 01\n",
        "  read #0 \"r\" [ &1+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
    ))
    .unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_keeps_address_sources() {
    // trimming the tail of "table" would silently drop the pointer steering
    // the "load" access of the other memory
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"table\" { bytes 00 01 ptr $0:4 -> &1 }\n",
        "  read #0 \"peek\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"data\" bytes aa bb\n",
        "  read #1 \"load\" [ &1*:2 ] via [ $0 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_compact_empty_memory() {
    let source = concat!("memory %0 {\n", "}\n");
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = compacted(design);
    assert_isomorphic!(design, gold);
}
