//! Geometry builtins
//!
//! Sets stand for the centroid of their members when a point is needed.
//! Coordinates are read from the host as the `x`, `y`, `z` properties.

use super::{expect_args, number_arg, BuiltinTable};
use crate::interpreter::errors::{ErrorKind, ScriptError, ScriptResult};
use crate::interpreter::host::Host;
use crate::interpreter::selection::{SelectionSet, SetFlavor};
use crate::interpreter::types::{Point3, Value};

pub(super) fn register(table: &mut BuiltinTable) {
    table.register("point", |args, host| {
        expect_args("point", args, 1, 3)?;
        if args.len() == 1 {
            return Ok(Value::Point(as_point(&args[0], host)?));
        }
        expect_args("point", args, 3, 3)?;
        Ok(Value::Point(Point3::new(
            number_arg("point", args, 0)?,
            number_arg("point", args, 1)?,
            number_arg("point", args, 2)?,
        )))
    });
    table.register("plane", |args, _| {
        expect_args("plane", args, 4, 4)?;
        let mut plane = [0.0; 4];
        for (i, slot) in plane.iter_mut().enumerate() {
            *slot = number_arg("plane", args, i)?;
        }
        Ok(Value::Plane(plane))
    });
    table.register("distance", |args, host| {
        expect_args("distance", args, 2, 2)?;
        let a = as_point(&args[0], host)?;
        let b = as_point(&args[1], host)?;
        Ok(Value::Float(a.distance(&b)))
    });
    table.register("within", |args, host| {
        expect_args("within", args, 2, 2)?;
        let radius = number_arg("within", args, 0)?;
        let Value::Set(centers) = &args[1] else {
            return Err(ScriptError::new(ErrorKind::ExpressionExpected).detail("within()"));
        };
        within(radius, centers, host)
    });
}

fn position(host: &dyn Host, index: usize) -> ScriptResult<Point3> {
    let mut coords = [0.0; 3];
    for (slot, axis) in coords.iter_mut().zip(["x", "y", "z"]) {
        *slot = host
            .property(SetFlavor::Particle, index, axis)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ScriptError::new(ErrorKind::UnrecognizedAtomProperty).detail(axis))?;
    }
    Ok(Point3::from_array(coords))
}

fn as_point(value: &Value, host: &dyn Host) -> ScriptResult<Point3> {
    match value {
        Value::Point(p) => Ok(*p),
        Value::Set(set) if set.flavor() == SetFlavor::Particle => {
            if set.is_empty() {
                return Err(ScriptError::new(ErrorKind::ExpressionExpected).detail("empty set"));
            }
            let mut sum = [0.0; 3];
            for idx in set.indices() {
                let p = position(host, idx)?.to_array();
                for (s, c) in sum.iter_mut().zip(p) {
                    *s += c;
                }
            }
            let n = set.count() as f64;
            Ok(Point3::new(sum[0] / n, sum[1] / n, sum[2] / n))
        }
        other => Err(ScriptError::new(ErrorKind::CoordinateOrNameOrExpressionRequired)
            .detail(other.type_name())),
    }
}

/// Particles within `radius` of any member of `centers`, members included
fn within(radius: f64, centers: &SelectionSet, host: &dyn Host) -> ScriptResult<Value> {
    let n = host.particle_count();
    let anchors: Vec<Point3> = centers
        .indices()
        .map(|i| position(host, i))
        .collect::<ScriptResult<_>>()?;
    let mut out = SelectionSet::empty(SetFlavor::Particle, n);
    for idx in 0..n {
        if centers.contains(idx) {
            out.insert(idx);
            continue;
        }
        let p = position(host, idx)?;
        if anchors.iter().any(|a| a.distance(&p) <= radius) {
            out.insert(idx);
        }
    }
    Ok(Value::Set(out))
}
