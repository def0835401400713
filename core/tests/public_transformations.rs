use graft_core::floats::ConvertPrecision;
use graft_core::internal::*;
use graft_core::optim::{ConstantFolding, LowLatency, MakeStateful};

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("GRAFT_LOG").try_init();
}

fn count_ops(model: &Graph, name: &str) -> usize {
    model.nodes().filter(|n| n.op.name() == name).count()
}

/// parameter -> relu -> reshape(relu, shape_of(relu)) -> result
fn get_model() -> GraftResult<Graph> {
    let mut model = Graph::named("test");
    let param = model.add_parameter("parameter", f32::fact([1, 3, 22, 22]))?;
    model.set_outlet_names(param, ["parameter"])?;
    let relu = model.wire_node("relu", ElementWiseOp::Relu, &[param])?;
    let shape = model.wire_node("shape_of", ShapeOf::default(), &[relu[0]])?;
    let reshape = model.wire_node("reshape", Reshape::new(false), &[relu[0], shape[0]])?;
    model.set_outlet_names(reshape[0], ["result"])?;
    let result = model.add_result("result", reshape[0])?;
    model.with_interface(&[result], &[param.node])
}

fn sample(shape: &[usize], seed: f32) -> GraftResult<Arc<Tensor>> {
    let len = shape.iter().product::<usize>();
    let data = (0..len).map(|i| ((i as f32) * 0.37 + seed).sin()).collect::<Vec<f32>>();
    Ok(Tensor::from_shape(shape, &data)?.into_arc_tensor())
}

#[test]
fn make_stateful() -> GraftResult<()> {
    setup_test_logger();
    let mut model = get_model()?;
    let mut manager = PassManager::new();
    manager.register(MakeStateful::new([("parameter", "result")]));
    manager.run(&mut model)?;
    assert_eq!(model.parameters().len(), 0);
    assert_eq!(model.results().len(), 0);
    assert_eq!(count_ops(&model, "ReadValue"), 1);
    assert_eq!(count_ops(&model, "Assign"), 1);
    model.validate()?;
    Ok(())
}

#[test]
fn constant_folding() -> GraftResult<()> {
    setup_test_logger();
    let mut model = get_model()?;
    let mut manager = PassManager::new();
    manager.register(ConstantFolding);
    manager.run(&mut model)?;
    assert_eq!(count_ops(&model, "ShapeOf"), 0);
    assert!(!ConstantFolding.run(&mut model)?);

    let input = sample(&[1, 3, 22, 22], 0.0)?;
    let expected = SimplePlan::new(get_model()?)?.run(tvec!(input.clone()))?;
    let found = SimplePlan::new(&model)?.run(tvec!(input))?;
    assert_eq!(expected, found);
    Ok(())
}

#[test]
fn convert_precision() -> GraftResult<()> {
    setup_test_logger();
    let mut model = get_model()?;
    assert_eq!(model.parameter_fact(0)?.datum_type, DatumType::F32);
    let mut manager = PassManager::new();
    manager.register(ConvertPrecision::f32_to_f16());
    manager.run(&mut model)?;
    assert_eq!(model.parameter_fact(0)?.datum_type, DatumType::F16);
    assert_eq!(model.parameter_fact(0)?.shape, f32::fact([1, 3, 22, 22]).shape);
    assert_eq!(model.result_fact(0)?.datum_type, DatumType::F16);
    assert_eq!(count_ops(&model, "ShapeOf"), 1);
    Ok(())
}

#[test]
fn stale_handle_after_pipeline() -> GraftResult<()> {
    let mut model = get_model()?;
    let shape_of = model.node_by_name("shape_of")?.id;
    PassManager::new().register(ConstantFolding).run(&mut model)?;
    let err = model.node(shape_of).unwrap_err();
    assert_eq!(GraphError::find(&err), Some(&GraphError::StaleHandle(shape_of)));
    Ok(())
}

#[test]
fn failing_pass_aborts_pipeline() -> GraftResult<()> {
    let mut model = get_model()?;
    let mut manager = PassManager::new();
    manager
        .register(ConstantFolding)
        .register(MakeStateful::new([("parameter", "nope")]))
        .register(ConvertPrecision::f32_to_f16());
    let err = manager.run(&mut model).unwrap_err();
    assert!(matches!(GraphError::find(&err), Some(GraphError::InvalidGraph(_))));
    assert_eq!(count_ops(&model, "ShapeOf"), 0);
    assert_eq!(model.parameters().len(), 1);
    assert_eq!(model.parameter_fact(0)?.datum_type, DatumType::F32);
    Ok(())
}

/// X and Y [32, 40, 10] sliced along axis 1 in chunks of 2, M [32, 2, 10]
/// invariant, body computes (X_i + Y_i) * M.
fn loop_model(len: Dim) -> GraftResult<Graph> {
    let mut body = Graph::named("body_function");
    let x_i = body.add_parameter("X_i", f32::fact([32, 2, 10]))?;
    let y_i = body.add_parameter("Y_i", f32::fact([32, 2, 10]))?;
    let m_body = body.add_parameter("M_body", f32::fact([32, 2, 10]))?;
    let add = body.wire_node("add", BinaryOp::Add, &[x_i, y_i])?;
    let zo = body.wire_node("zo", BinaryOp::Mul, &[add[0], m_body])?;
    body.add_result("zo", zo[0])?;

    let mut ti = TensorIterator::new(body);
    ti.sliced_input(0, 1, 0, 2, 2, 39);
    ti.sliced_input(1, 1, 0, 2, 2, -1);
    ti.invariant_input(2);
    ti.last_iteration_output(0);
    ti.concatenated_output(0, 1, 2, 2);

    let sliced = TypedFact::dt_shape(DatumType::F32, [Dim::Fixed(32), len, Dim::Fixed(10)]);
    let mut model = Graph::named("loop");
    let x = model.add_parameter("X", sliced.clone())?;
    let y = model.add_parameter("Y", sliced)?;
    let m = model.add_parameter("M", f32::fact([32, 2, 10]))?;
    let outputs = model.wire_node("ti", ti, &[x, y, m])?;
    model.add_result("out0", outputs[0])?;
    model.add_result("out1", outputs[1])?;
    Ok(model)
}

#[test]
fn low_latency_preserves_loop_semantics() -> GraftResult<()> {
    setup_test_logger();
    let original = loop_model(Dim::Fixed(40))?;
    assert_eq!(*original.result_fact(1)?, f32::fact([32, 40, 10]));
    let mut unrolled = original.clone();
    let mut manager = PassManager::new();
    manager.register(LowLatency);
    manager.run(&mut unrolled)?;
    assert_eq!(count_ops(&unrolled, "TensorIterator"), 0);
    assert_eq!(count_ops(&unrolled, "Slice"), 40);

    let inputs = tvec!(
        sample(&[32, 40, 10], 0.0)?,
        sample(&[32, 40, 10], 1.0)?,
        sample(&[32, 2, 10], 2.0)?
    );
    let expected = SimplePlan::new(&original)?.run(inputs.clone())?;
    let found = SimplePlan::new(&unrolled)?.run(inputs)?;
    assert_eq!(expected.len(), found.len());
    for (e, f) in expected.iter().zip(found.iter()) {
        assert_eq!(e.shape(), f.shape());
        for (a, b) in e.to_vec::<f32>()?.into_iter().zip(f.to_vec::<f32>()?) {
            approx::assert_relative_eq!(a, b, max_relative = 1e-5, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn low_latency_ignores_dynamic_loops() -> GraftResult<()> {
    let mut model = loop_model(Dim::Dynamic)?;
    assert!(!LowLatency.run(&mut model)?);
    assert_eq!(count_ops(&model, "TensorIterator"), 1);
    Ok(())
}
