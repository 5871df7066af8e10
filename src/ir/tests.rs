use super::eval::{EvalError, Machine, RtValue};
use super::*;

fn group_lane_kernel() -> Function {
    let mut func = Function::new("kernel", vec![Param::new("dim", Type::I32)], Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let r0 = b.intrinsic(Intrinsic::GetR0, Type::vector(32, 8), "r0");
    let lane = b.extract_element(r0, Value::i32(1), "lane");
    b.ret(Some(lane));
    func
}

#[test]
fn test_new_function_has_entry_block() {
    let func = Function::new("f", Vec::new(), Type::Void);
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(func.blocks[0].name, "entry");
    assert_eq!(func.inst_count(), 0);
}

#[test]
fn test_erase_leaves_tombstone() {
    let mut func = group_lane_kernel();
    let ret = func.blocks[0].insts[2];
    assert!(func.erase(ret).is_some());
    assert!(func.inst(ret).is_none());
    assert_eq!(func.arena_len(), 3);
    assert_eq!(func.inst_count(), 2);
    // erasing twice is harmless
    assert!(func.erase(ret).is_none());
}

#[test]
fn test_replace_and_erase_rewires_every_use() {
    let mut func = Function::new("f", vec![Param::new("x", Type::I32)], Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let call = b.call("__query", Vec::new(), Type::I32, "q");
    let sum = b.add(call.clone(), call.clone(), "sum");
    b.ret(Some(sum));

    let id = call.as_inst().unwrap();
    let replaced = func.replace_and_erase(id, &Value::Param(0));
    assert_eq!(replaced, 2);
    assert!(func.inst(id).is_none());
    assert_eq!(func.count_uses(&call), 0);
    assert_eq!(func.count_uses(&Value::Param(0)), 2);
    assert!(func.call_sites().is_empty());
}

#[test]
fn test_builder_inserts_before_anchor_in_order() {
    let mut func = Function::new("f", Vec::new(), Type::I32);
    let entry = func.entry();
    let anchor = {
        let mut b = Builder::at_end(&mut func, entry);
        b.call("__query", Vec::new(), Type::I32, "q")
    };
    let anchor = anchor.as_inst().unwrap();
    let mut b = Builder::before(&mut func, anchor).unwrap();
    let a = b.add(Value::i32(1), Value::i32(2), "a");
    let m = b.mul(a.clone(), Value::i32(3), "m");

    let order: Vec<InstId> = func.blocks[0].insts.clone();
    assert_eq!(
        order,
        vec![a.as_inst().unwrap(), m.as_inst().unwrap(), anchor]
    );
}

#[test]
fn test_builder_rejects_erased_anchor() {
    let mut func = Function::new("f", Vec::new(), Type::I32);
    let entry = func.entry();
    let anchor = {
        let mut b = Builder::at_end(&mut func, entry);
        b.call("__query", Vec::new(), Type::I32, "q")
    };
    let anchor = anchor.as_inst().unwrap();
    func.erase(anchor);
    assert!(Builder::before(&mut func, anchor).is_none());
}

#[test]
fn test_builder_elides_noop_casts() {
    let mut func = Function::new("f", vec![Param::new("x", Type::I32)], Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let same = b.zext(Value::Param(0), Type::I32, "z");
    assert_eq!(same, Value::Param(0));
    let same = b.trunc(Value::Param(0), Type::I32, "t");
    assert_eq!(same, Value::Param(0));
    let wide = b.zext(Value::Param(0), Type::I64, "w");
    assert_eq!(b.type_of(&wide), Type::I64);
    assert_eq!(func.inst_count(), 1);
}

#[test]
fn test_type_sizes() {
    assert_eq!(Type::I1.byte_size(), 1);
    assert_eq!(Type::vector(64, 3).byte_size(), 24);
    assert_eq!(Type::vector(8, 6).elem(), Some(Type::I8));
    assert_eq!(Type::ptr(AddressSpace::A32).byte_size(), 4);
    assert_eq!(Type::ptr(AddressSpace::Global).scalar_bits(), None);
    assert_eq!(width_mask(16), 0xffff);
    assert_eq!(width_mask(64), u64::MAX);
}

#[test]
fn test_value_constants_are_masked() {
    assert_eq!(
        Value::int(8, 0x1ff),
        Value::Const(Constant::Int {
            bits: 8,
            value: 0xff
        })
    );
}

#[test]
fn test_listing_text() {
    let func = group_lane_kernel();
    insta::assert_snapshot!(func.to_string(), @r"
    define i32 @kernel(i32 %dim) {
    entry:
      %r0.0 = get_r0 : <8 x i32>
      %lane.1 = extractelement %r0.0, i32 1 : i32
      ret %lane.1
    }
    ");
}

#[test]
fn test_listing_attributes_and_unnamed_values() {
    let mut func = Function::new("helper", vec![Param::new("", Type::I64)], Type::Void)
        .with_attribute("stack-call");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let t = b.trunc(Value::Param(0), Type::I16, "");
    b.call("sink", vec![t], Type::Void, "");
    b.ret(None);
    insta::assert_snapshot!(func.to_string(), @r"
    define void @helper(i64 %arg0) #[stack-call] {
    entry:
      %0 = trunc %arg0 : i16
      call @sink(%0)
      ret void
    }
    ");
}

#[test]
fn test_listing_spans_cover_instruction_text() {
    let func = group_lane_kernel();
    let listing = func.listing();
    let lane = func.blocks[0].insts[1];
    let span = listing.span_of(lane).unwrap();
    assert_eq!(
        &listing.text[span],
        "%lane.1 = extractelement %r0.0, i32 1 : i32"
    );
    assert_eq!(
        &listing.text[listing.header.clone()],
        "define i32 @kernel(i32 %dim)"
    );
}

#[test]
fn test_eval_reads_thread_state() {
    let func = group_lane_kernel();
    let machine = Machine::new().with_r0(vec![0, 42, 0, 0, 0, 0, 7, 9]);
    let out = machine.run(&func, &[RtValue::int(32, 0)]).unwrap();
    assert_eq!(out.ret, Some(RtValue::int(32, 42)));
}

#[test]
fn test_eval_branches() {
    let mut func = Function::new("pick", vec![Param::new("c", Type::I32)], Type::I32);
    let entry = func.entry();
    let yes = func.add_block("yes");
    let no = func.add_block("no");
    {
        let mut b = Builder::at_end(&mut func, entry);
        let cond = b.icmp(CmpPred::Sgt, Value::Param(0), Value::i32(0), "pos");
        b.cond_br(cond, yes, no);
    }
    Builder::at_end(&mut func, yes).ret(Some(Value::i32(1)));
    Builder::at_end(&mut func, no).ret(Some(Value::i32(2)));

    let machine = Machine::new();
    let run = |v: u64| machine.run(&func, &[RtValue::int(32, v)]).unwrap().ret;
    assert_eq!(run(5), Some(RtValue::int(32, 1)));
    // sgt is signed: 0xffffffff is -1
    assert_eq!(run(0xffff_ffff), Some(RtValue::int(32, 2)));
}

#[test]
fn test_eval_rejects_misaligned_load() {
    let mut func = Function::new("f", Vec::new(), Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let ptr = b.int_to_ptr(Value::i32(2), AddressSpace::A32, "p");
    let v = b.load(ptr, Type::I32, 4, "v");
    b.ret(Some(v));

    let machine = Machine::new().with_side_buffer(vec![0; 16]);
    let err = machine.run(&func, &[]).unwrap_err();
    assert!(matches!(
        err,
        EvalError::MisalignedLoad {
            addr: 2,
            align: 4,
            ..
        }
    ));
}

#[test]
fn test_eval_bitcast_is_little_endian() {
    let mut func = Function::new("f", Vec::new(), Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let bytes = b.bitcast(Value::vector(8, &[0x01, 0x02, 0x03, 0x04]), Type::I32, "w");
    b.ret(Some(bytes));
    let out = Machine::new().run(&func, &[]).unwrap();
    assert_eq!(out.ret, Some(RtValue::int(32, 0x0403_0201)));
}

#[test]
fn test_eval_records_void_calls() {
    let mut func = Function::new("f", Vec::new(), Type::Void);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    b.call("store", vec![Value::i32(3)], Type::Void, "");
    b.ret(None);
    let out = Machine::new().run(&func, &[]).unwrap();
    assert_eq!(out.effects, vec![("store".to_string(), vec![RtValue::int(32, 3)])]);
}

#[test]
fn test_eval_unresolved_call_is_an_error() {
    let mut func = Function::new("f", Vec::new(), Type::I32);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let v = b.call("mystery", Vec::new(), Type::I32, "v");
    b.ret(Some(v));
    let err = Machine::new().run(&func, &[]).unwrap_err();
    assert!(matches!(err, EvalError::UnresolvedCall { .. }));
}

#[test]
fn test_module_json_roundtrip() {
    let mut module = Module::new("m");
    module.functions.push(group_lane_kernel().with_attribute("stack-call"));
    let json = serde_json::to_string_pretty(&module).unwrap();
    let back: Module = serde_json::from_str(&json).unwrap();
    assert_eq!(back, module);
    assert!(json.contains("\"opcode\": \"extract_element\""));
}
