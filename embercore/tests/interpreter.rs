use std::rc::Rc;

use embercore::call::InterpretedFunction;
use embercore::code::{CodeObject, Instruction, NameEntry, NameScope, Opcode};
use embercore::config::VmConfig;
use embercore::errors::ExceptionKind;
use embercore::object::{Object, Payload};
use embercore::value::Value;
use embercore::Vm;

fn instr(op: Opcode, arg: i32) -> Instruction {
	Instruction { op: op as u8, arg, line: 1, block: -1 }
}

fn make_vm() -> Vm {
	Vm::new(VmConfig::default())
}

fn tuple_elems(_vm: &Vm, value: &Value) -> Vec<Value> {
	match value.as_obj().map(|o| &o.payload) {
		Some(Payload::Tuple(items)) => items.to_vec(),
		_ => panic!("expected a tuple value"),
	}
}

/// `def f(a, b=2, *c): return (a, b, c)`, hand-assembled as a function
/// whose body just returns its own bound locals packed into a tuple via
/// `BUILD_INDEX`.
fn make_f(vm: &mut Vm, module: &Value) -> Value {
	let a = vm.interner_mut().intern("a");
	let b = vm.interner_mut().intern("b");
	let c = vm.interner_mut().intern("c");

	let mut body = CodeObject::new("<test>", "f");
	body.names.push(NameEntry { name: a, scope: NameScope::Local });
	body.names.push(NameEntry { name: b, scope: NameScope::Local });
	body.names.push(NameEntry { name: c, scope: NameScope::Local });
	body.instructions.push(instr(Opcode::LoadName, 0));
	body.instructions.push(instr(Opcode::LoadName, 1));
	body.instructions.push(instr(Opcode::LoadName, 2));
	body.instructions.push(instr(Opcode::BuildIndex, 3));
	body.instructions.push(instr(Opcode::Return, 0));
	Vm::optimize_code(&mut body);

	let default_b = Value::int(2).unwrap();
	let func = InterpretedFunction {
		name: "f".to_string(),
		code: Rc::new(body),
		params: vec![a, b],
		defaults: vec![(b, default_b)],
		star_param: Some(c),
		module: module.clone(),
		closure: None,
	};
	Value::obj(Rc::new(Object::new(vm.builtin_types().function, Payload::Function(Rc::new(func)))))
}

#[test]
fn starred_overflow_fills_defaults_positionally_before_spilling() {
	let mut vm = make_vm();
	let module = vm.new_module("m").unwrap();
	let f = make_f(&mut vm, &module);

	// f(1,) -> (1, 2, ())
	let result = vm.call(f.clone(), vec![Value::int(1).unwrap()]).unwrap();
	let elems = tuple_elems(&vm, &result);
	assert_eq!(elems[0].as_int(), Some(1));
	assert_eq!(elems[1].as_int(), Some(2));
	assert!(tuple_elems(&vm, &elems[2]).is_empty());

	// f(1, 10, 20, 30) -> (1, 10, (20, 30))
	let args = vec![Value::int(1).unwrap(), Value::int(10).unwrap(), Value::int(20).unwrap(), Value::int(30).unwrap()];
	let result = vm.call(f.clone(), args).unwrap();
	let elems = tuple_elems(&vm, &result);
	assert_eq!(elems[0].as_int(), Some(1));
	assert_eq!(elems[1].as_int(), Some(10));
	let rest = tuple_elems(&vm, &elems[2]);
	assert_eq!(rest.iter().map(|v| v.as_int().unwrap()).collect::<Vec<_>>(), vec![20, 30]);
}

#[test]
fn missing_required_positional_argument_raises_type_error() {
	let mut vm = make_vm();
	let module = vm.new_module("m").unwrap();
	let f = make_f(&mut vm, &module);

	let err = vm.call(f, vec![]).unwrap_err();
	assert_eq!(err.kind, ExceptionKind::TypeError);
}

#[test]
fn unknown_keyword_argument_is_rejected() {
	let mut vm = make_vm();
	let module = vm.new_module("m").unwrap();
	let f = make_f(&mut vm, &module);

	let z = vm.interner_mut().intern("z");
	let args = vec![Value::int(1).unwrap(), Value::int(2).unwrap()];
	let outcome = embercore::call::dispatch(&mut vm, f, args, vec![(z, Value::int(9).unwrap())], false);
	let err = outcome.unwrap_err();
	assert_eq!(err.kind, ExceptionKind::TypeError);
}

#[test]
fn native_function_arity_mismatch_raises_type_error() {
	let mut vm = make_vm();
	let module = vm.new_module("m").unwrap();
	vm.bind_func(&module, "double", 1, |_vm, args| Value::int(args[0].as_int().unwrap() * 2));

	let double_name = vm.interner_mut().intern("double");
	let double = embercore::attrs::getattr(&mut vm, &module, double_name, true).unwrap().unwrap();
	let err = vm.call(double, vec![]).unwrap_err();
	assert_eq!(err.kind, ExceptionKind::TypeError);
}

#[test]
fn class_construction_runs_init_and_isinstance_holds() {
	let mut vm = make_vm();
	let ty = vm.new_type("Point", None);
	vm.bind_method(ty, "__init__", 2, |vm, args| {
		let this = args[0].clone();
		embercore::attrs::setattr(vm, &this, vm.interner_mut().intern("x"), args[1].clone())?;
		embercore::attrs::setattr(vm, &this, vm.interner_mut().intern("y"), args[2].clone())?;
		Ok(vm.none_value())
	});

	let ctor = vm.types().get(ty).object.clone();
	let instance = vm.call(ctor, vec![Value::int(3).unwrap(), Value::int(4).unwrap()]).unwrap();

	assert!(vm.types().is_subtype(vm.type_of(&instance), ty));
	let x_name = vm.interner_mut().intern("x");
	let x = embercore::attrs::getattr(&mut vm, &instance, x_name, true).unwrap().unwrap();
	assert_eq!(x.as_int(), Some(3));
}

#[test]
fn try_except_catches_a_raise_and_truncates_the_stack() {
	let mut vm = make_vm();
	let module = vm.new_module("m").unwrap();

	// try: raise ValueError("boom")
	// except: pass
	// return 99
	let exc_name = vm.interner_mut().intern("exc");
	let mut body = CodeObject::new("<test>", "g");
	body.names.push(NameEntry { name: exc_name, scope: NameScope::Local });
	body.instructions.push(instr(Opcode::PushTryBlock, 4));
	body.instructions.push(instr(Opcode::LoadName, 0));
	body.instructions.push(instr(Opcode::Raise, 0));
	body.instructions.push(instr(Opcode::PopBlock, 0));
	body.instructions.push(instr(Opcode::LoadConst, 0));
	body.instructions.push(instr(Opcode::Return, 0));
	body.consts.push(Value::int(99).unwrap());
	Vm::optimize_code(&mut body);

	let func = InterpretedFunction {
		name: "g".to_string(),
		code: Rc::new(body),
		params: vec![exc_name],
		defaults: Vec::new(),
		star_param: None,
		module: module.clone(),
		closure: None,
	};
	let g = Value::obj(Rc::new(Object::new(vm.builtin_types().function, Payload::Function(Rc::new(func)))));
	let exc = vm.make_exception(ExceptionKind::ValueError, "boom");

	let result = vm.call(g, vec![exc]).unwrap();
	assert_eq!(result.as_int(), Some(99));
}

#[test]
fn tuple_hash_is_stable_and_lists_are_unhashable() {
	let vm = make_vm();
	let a = Value::obj(Rc::new(Object::new(vm.builtin_types().tuple, Payload::Tuple(vec![Value::int(1).unwrap(), Value::int(2).unwrap()].into()))));
	let b = Value::obj(Rc::new(Object::new(vm.builtin_types().tuple, Payload::Tuple(vec![Value::int(1).unwrap(), Value::int(2).unwrap()].into()))));
	assert_eq!(embercore::typeops::hash_value(&vm, &a).unwrap(), embercore::typeops::hash_value(&vm, &b).unwrap());

	let list = Value::obj(Rc::new(Object::new(vm.builtin_types().list, Payload::List(std::cell::RefCell::new(vec![])))));
	let err = embercore::typeops::hash_value(&vm, &list).unwrap_err();
	assert_eq!(err.kind, ExceptionKind::TypeError);
}

#[test]
fn dunder_class_resolves_to_the_type_object_via_type_walk() {
	let mut vm = make_vm();
	let base = vm.new_type("A", None);
	let derived = vm.new_type("B", Some(base));

	let instance = vm.call(vm.types().get(derived).object.clone(), vec![]).unwrap();
	assert!(vm.types().is_subtype(vm.type_of(&instance), base));

	let class_name = vm.interner_mut().intern("__class__");
	let class = embercore::attrs::getattr(&mut vm, &instance, class_name, true).unwrap().unwrap();
	let Value::Obj(class_obj) = &class else { panic!("expected the type's own object") };
	let Payload::Type(ty) = class_obj.payload else { panic!("expected a Type payload") };
	assert_eq!(ty, derived);
}

/// A minimal data descriptor: `__get__(self, obj)` returns a fixed
/// constant; `__set__(self, obj, value)` records the value it was called
/// with onto the descriptor instance itself. Exercises both halves of the
/// protocol through plain instance attribute access on the owning class.
#[test]
fn data_descriptor_intercepts_both_get_and_set() {
	let mut vm = make_vm();
	let descriptor_ty = vm.new_type("Descriptor", None);
	vm.bind_method(descriptor_ty, "__get__", 1, |_vm, _args| Value::int(42));
	vm.bind_method(descriptor_ty, "__set__", 2, |vm, args| {
		let descriptor = args[0].clone();
		let last_set = vm.interner_mut().intern("last_set");
		embercore::attrs::setattr(vm, &descriptor, last_set, args[2].clone())?;
		Ok(vm.none_value())
	});

	let owner_ty = vm.new_type("Owner", None);
	let x_name = vm.interner_mut().intern("x");
	let descriptor_instance = vm.call(vm.types().get(descriptor_ty).object.clone(), vec![]).unwrap();
	let owner_class = vm.types().get(owner_ty).object.clone();
	embercore::attrs::setattr(&mut vm, &owner_class, x_name, descriptor_instance.clone()).unwrap();

	let owner = vm.call(owner_class, vec![]).unwrap();

	// `owner.x` is intercepted by `__get__` rather than returning the
	// descriptor instance itself.
	let got = embercore::attrs::getattr(&mut vm, &owner, x_name, true).unwrap().unwrap();
	assert_eq!(got.as_int(), Some(42));

	// `owner.x = 7` is intercepted by `__set__`, landing on the descriptor
	// instance rather than in `owner`'s own instance dict.
	embercore::attrs::setattr(&mut vm, &owner, x_name, Value::int(7).unwrap()).unwrap();
	let last_set_name = vm.interner_mut().intern("last_set");
	let recorded = embercore::attrs::getattr(&mut vm, &descriptor_instance, last_set_name, true).unwrap().unwrap();
	assert_eq!(recorded.as_int(), Some(7));
}

/// A user-defined object with no builtin truthy rule falls back to
/// `__len__` (§4.E), rather than always being `True`.
#[test]
fn truthiness_falls_back_to_user_defined_len() {
	let mut vm = make_vm();
	let ty = vm.new_type("Bag", None);
	vm.bind_method(ty, "__init__", 1, |vm, args| {
		let count_name = vm.interner_mut().intern("count");
		embercore::attrs::setattr(vm, &args[0], count_name, args[1].clone())?;
		Ok(vm.none_value())
	});
	vm.bind_method(ty, "__len__", 0, |vm, args| {
		let count_name = vm.interner_mut().intern("count");
		Ok(embercore::attrs::getattr(vm, &args[0], count_name, true)?.expect("count was set in __init__"))
	});

	let ctor = vm.types().get(ty).object.clone();
	let empty = vm.call(ctor.clone(), vec![Value::int(0).unwrap()]).unwrap();
	let full = vm.call(ctor, vec![Value::int(3).unwrap()]).unwrap();

	assert!(!embercore::typeops::as_bool(&mut vm, &empty).unwrap());
	assert!(embercore::typeops::as_bool(&mut vm, &full).unwrap());
}

/// A plain instance with no `__len__` at all is always truthy (§4.E "else
/// `True`").
#[test]
fn truthiness_defaults_to_true_without_len() {
	let mut vm = make_vm();
	let ty = vm.new_type("Empty", None);
	let ctor = vm.types().get(ty).object.clone();
	let instance = vm.call(ctor, vec![]).unwrap();
	assert!(embercore::typeops::as_bool(&mut vm, &instance).unwrap());
}

/// `exec` never propagates a Rust `Err`: an unhandled exception is caught,
/// its summary is written to the (in-memory, since stdio is opted out)
/// error sink, and `exec` itself returns `None` (§6, §7).
#[test]
fn exec_catches_unhandled_exceptions_and_reports_to_the_error_sink() {
	let mut vm = Vm::new(VmConfig { use_stdio: false, ..VmConfig::default() });
	let module = vm.new_module("__main__").unwrap();

	// Body: raise ValueError('boom'); no try-block catches it.
	let exc_name = vm.interner_mut().intern("exc");
	let mut body = CodeObject::new("<test>", "<module>");
	body.names.push(NameEntry { name: exc_name, scope: NameScope::Global });
	body.instructions.push(instr(Opcode::LoadName, 0));
	body.instructions.push(instr(Opcode::Raise, 0));
	Vm::optimize_code(&mut body);

	let exc = vm.make_exception(ExceptionKind::ValueError, "boom");
	embercore::module::module_dict(&module).borrow_mut().set(exc_name, exc);

	let result = vm.exec(&module, Rc::new(body));
	assert!(result.is_none());
	let stderr = vm.stderr_contents().expect("use_stdio=false means an in-memory sink");
	assert!(stderr.contains("ValueError"));
	assert!(stderr.contains("boom"));
}

/// `None`/`True`/`False`/`Ellipsis` are each created exactly once and
/// compared by identity (§3, §4.A); every call to `bool_value(b)` for the
/// same `b` must return the very same boxed object, not a fresh allocation.
#[test]
fn bool_value_returns_singletons() {
	let vm = make_vm();
	assert!(vm.bool_value(true).is(&vm.bool_value(true)));
	assert!(vm.bool_value(false).is(&vm.bool_value(false)));
	assert!(!vm.bool_value(true).is(&vm.bool_value(false)));
}

/// `iter(value)` (§4.E "asIter") dispatches to a user-defined `__iter__`,
/// passes a generator through unchanged, and rejects anything with neither.
#[test]
fn as_iter_dispatches_to_dunder_iter_or_rejects_noniterables() {
	let mut vm = make_vm();
	let ty = vm.new_type("Wrapper", None);
	vm.bind_method(ty, "__iter__", 0, |vm, args| {
		let marker = vm.interner_mut().intern("marker");
		embercore::attrs::getattr(vm, &args[0], marker, true)
	});
	let marker_name = vm.interner_mut().intern("marker");
	vm.bind_method(ty, "__init__", 1, move |vm, args| {
		embercore::attrs::setattr(vm, &args[0], marker_name, args[1].clone())?;
		Ok(vm.none_value())
	});

	let ctor = vm.types().get(ty).object.clone();
	let sentinel = Value::int(99).unwrap();
	let wrapper = vm.call(ctor, vec![sentinel.clone()]).unwrap();

	let iterated = embercore::typeops::as_iter(&mut vm, &wrapper).unwrap();
	assert_eq!(iterated.as_int(), sentinel.as_int());

	let plain_ty = vm.new_type("Plain", None);
	let plain = vm.call(vm.types().get(plain_ty).object.clone(), vec![]).unwrap();
	let err = embercore::typeops::as_iter(&mut vm, &plain).unwrap_err();
	assert_eq!(err.kind, ExceptionKind::TypeError);
}

/// `def g(): yield 1; yield 2` driven through `Vm::generator_next` (§8
/// concrete scenario 3): first step yields `1`, second yields `2`, third
/// exhausts it and every call after that keeps returning `None`.
#[test]
fn generator_yields_then_exhausts() {
	let mut vm = make_vm();
	let module = vm.new_module("__main__").unwrap();

	let mut body = CodeObject::new("<test>", "g");
	body.consts.push(Value::int(1).unwrap());
	body.consts.push(Value::int(2).unwrap());
	body.instructions.push(instr(Opcode::LoadConst, 0));
	body.instructions.push(instr(Opcode::Yield, 0));
	body.instructions.push(instr(Opcode::LoadConst, 1));
	body.instructions.push(instr(Opcode::Yield, 0));
	body.is_generator = true;
	Vm::optimize_code(&mut body);

	let func = InterpretedFunction {
		name: "g".to_string(),
		code: Rc::new(body),
		params: vec![],
		defaults: vec![],
		star_param: None,
		module: module.clone(),
		closure: None,
	};
	let g = Value::obj(Rc::new(Object::new(vm.builtin_types().function, Payload::Function(Rc::new(func)))));

	let generator = vm.call(g, vec![]).unwrap();

	assert_eq!(vm.generator_next(&generator).unwrap().and_then(|v| v.as_int()), Some(1));
	assert_eq!(vm.generator_next(&generator).unwrap().and_then(|v| v.as_int()), Some(2));
	assert_eq!(vm.generator_next(&generator).unwrap(), None);
	assert_eq!(vm.generator_next(&generator).unwrap(), None);
}
