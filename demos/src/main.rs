use std::rc::Rc;

use embercore::call::InterpretedFunction;
use embercore::code::{CodeObject, Instruction, NameEntry, NameScope, Opcode};
use embercore::config::VmConfig;
use embercore::object::{Object, Payload};
use embercore::value::Value;
use embercore::Vm;

fn setup_tracing() {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
}

fn instr(op: Opcode, arg: i32) -> Instruction {
	Instruction { op: op as u8, arg, line: 1, block: -1 }
}

/// Hand-assembles `def greet(name): return name` and calls it once, since
/// this crate has no compiler of its own — a host embedding it is expected
/// to produce `CodeObject`s the same way this demo does by hand.
fn main() {
	setup_tracing();

	let mut vm = Vm::new(VmConfig::default());
	let module = vm.new_module("__main__").expect("module registered exactly once");

	vm.bind_func(&module, "log", 1, |vm, args| {
		let text = embercore::typeops::as_str(vm, &args[0])?;
		tracing::info!(%text, "script output");
		Ok(vm.none_value())
	});

	let name_param = vm.interner_mut().intern("name");
	let log_name = vm.interner_mut().intern("log");

	let mut body = CodeObject::new("<demo>", "greet");
	body.names.push(NameEntry { name: name_param, scope: NameScope::Local });
	body.names.push(NameEntry { name: log_name, scope: NameScope::Global });
	body.instructions.push(instr(Opcode::LoadName, 1)); // log
	body.instructions.push(instr(Opcode::LoadName, 0)); // name
	body.instructions.push(instr(Opcode::Call, 1));
	body.instructions.push(instr(Opcode::Return, 0));
	Vm::optimize_code(&mut body);

	let greet = InterpretedFunction {
		name: "greet".to_string(),
		code: Rc::new(body),
		params: vec![name_param],
		defaults: Vec::new(),
		star_param: None,
		module: module.clone(),
		closure: None,
	};
	let greet_value = Value::obj(Rc::new(Object::new(vm.builtin_types().function, Payload::Function(Rc::new(greet)))));

	let arg = vm.str_value("world");
	match vm.call(greet_value, vec![arg]) {
		Ok(_) => tracing::info!("greet() returned"),
		Err(e) => tracing::error!(error = %e, "greet() raised"),
	}
}
