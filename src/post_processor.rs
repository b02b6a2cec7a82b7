use std::io::Write;

use json::JsonValue;
use log::info;

use crate::{
    datatypes::{Element, Node, Vertex},
    error::{Result, SideriteError},
};

/// Factor applied to displacements when building deformed geometry.
///
/// Elastic displacements are usually far smaller than the part, so the
/// deformed shape is exaggerated by default to be visible at all.
pub const DEFAULT_DISPLACEMENT_SCALE: f64 = 100.0;

fn solved_displacements(node: &Node, index: usize) -> Result<(f64, f64)> {
    match (node.ux, node.uy) {
        (Some(ux), Some(uy)) => Ok((ux, uy)),
        _ => Err(SideriteError::PostProcessor(format!(
            "node {index} has no solved displacement; run the solver first"
        ))),
    }
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `elements` - A reference to the vector of post-solve elements
/// * `nodes` - A reference to the vector of post-solve nodes
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    elements: &Vec<Element>,
    nodes: &Vec<Node>,
    nodes_output: &str,
    elements_output: &str,
) -> Result<()> {
    let mut nodes_file = std::fs::File::create(nodes_output)?;
    let mut elements_file = std::fs::File::create(elements_output)?;

    // Write nodes
    writeln!(nodes_file, "x,y,ux,uy")?;
    for (index, node) in nodes.iter().enumerate() {
        let (ux, uy) = solved_displacements(node, index)?;
        writeln!(
            nodes_file,
            "{x},{y},{ux},{uy}",
            x = node.vertex.x,
            y = node.vertex.y,
        )?;
    }

    // Write elements
    writeln!(elements_file, "n0,n1,n2,stress")?;
    for (index, element) in elements.iter().enumerate() {
        let stress = element.stress.ok_or_else(|| {
            SideriteError::PostProcessor(format!(
                "element {index} has no stress; run the solver first"
            ))
        })?;
        writeln!(
            elements_file,
            "{n0},{n1},{n2},{stress}",
            n0 = element.nodes[0],
            n1 = element.nodes[1],
            n2 = element.nodes[2],
        )?;
    }

    info!("wrote output to {} and {}", nodes_output, elements_output);

    Ok(())
}

/// Writes simulation results to a single JSON file
///
/// The file carries a `nodes` array with coordinates, displacements, and
/// nodal forces, and an `elements` array with connectivity and stress.
///
/// # Arguments
/// * `elements` - A reference to the vector of post-solve elements
/// * `nodes` - A reference to the vector of post-solve nodes
/// * `output` - The filename of the output json
pub fn json_output(elements: &Vec<Element>, nodes: &Vec<Node>, output: &str) -> Result<()> {
    let mut nodes_json: Vec<JsonValue> = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        let (ux, uy) = solved_displacements(node, index)?;

        let mut node_json = JsonValue::new_object();
        node_json["x"] = node.vertex.x.into();
        node_json["y"] = node.vertex.y.into();
        node_json["ux"] = ux.into();
        node_json["uy"] = uy.into();
        node_json["fx"] = node.fx.unwrap_or(0.0).into();
        node_json["fy"] = node.fy.unwrap_or(0.0).into();
        nodes_json.push(node_json);
    }

    let mut elements_json: Vec<JsonValue> = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        let stress = element.stress.ok_or_else(|| {
            SideriteError::PostProcessor(format!(
                "element {index} has no stress; run the solver first"
            ))
        })?;

        let mut element_json = JsonValue::new_object();
        element_json["nodes"] = vec![
            JsonValue::from(element.nodes[0]),
            JsonValue::from(element.nodes[1]),
            JsonValue::from(element.nodes[2]),
        ]
        .into();
        element_json["stress"] = stress.into();
        elements_json.push(element_json);
    }

    let mut root = JsonValue::new_object();
    root["nodes"] = nodes_json.into();
    root["elements"] = elements_json.into();

    std::fs::write(output, json::stringify_pretty(root, 2))?;

    info!("wrote output to {}", output);

    Ok(())
}

/// Builds the deformed vertex positions for visualization.
///
/// Each vertex moves by `scale` times its solved displacement. The node and
/// element vectors themselves are untouched, so connectivity from the mesh
/// applies to the returned vertices unchanged.
///
/// # Arguments
/// * `nodes` - A reference to the vector of post-solve nodes
/// * `scale` - The displacement exaggeration factor
///
/// # Returns
/// A vector of displaced vertices, in node order
pub fn deformed_vertices(nodes: &Vec<Node>, scale: f64) -> Result<Vec<Vertex>> {
    let mut vertices: Vec<Vertex> = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        let (ux, uy) = solved_displacements(node, index)?;
        vertices.push(Vertex {
            x: node.vertex.x + scale * ux,
            y: node.vertex.y + scale * uy,
        });
    }
    Ok(vertices)
}
