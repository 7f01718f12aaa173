use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use super::hashing::crc32_str;
use super::manifest::PakManifest;

/// Type names whose CRC-32 tags a `code`/`value` reference in the data.
pub const ACTION_TYPE_NAME: &str = "hap::Action";
pub const ENTITY_LAYOUT_TYPE_NAME: &str = "app::EntityLayout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCategory {
    Actions,
    Entities,
    ScriptVariables,
    Groups,
    Files,
}

impl IdCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Actions => "actions",
            Self::Entities => "entities",
            Self::ScriptVariables => "script variable",
            Self::Groups => "groups",
            Self::Files => "files",
        }
    }
}

impl fmt::Display for IdCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifiers seen during one validation run, one set per category.
#[derive(Debug, Default)]
pub struct IdRegistry {
    actions: HashSet<u64>,
    entities: HashSet<u64>,
    script_variables: HashSet<u64>,
    groups: HashSet<u64>,
    files: HashSet<u64>,
}

impl IdRegistry {
    /// Returns `false` when the id was already registered in `category`.
    pub fn register(&mut self, category: IdCategory, id: u64) -> bool {
        self.ids_mut(category).insert(id)
    }

    pub fn contains(&self, category: IdCategory, id: u64) -> bool {
        self.ids(category).contains(&id)
    }

    pub fn len(&self, category: IdCategory) -> usize {
        self.ids(category).len()
    }

    fn ids(&self, category: IdCategory) -> &HashSet<u64> {
        match category {
            IdCategory::Actions => &self.actions,
            IdCategory::Entities => &self.entities,
            IdCategory::ScriptVariables => &self.script_variables,
            IdCategory::Groups => &self.groups,
            IdCategory::Files => &self.files,
        }
    }

    fn ids_mut(&mut self, category: IdCategory) -> &mut HashSet<u64> {
        match category {
            IdCategory::Actions => &mut self.actions,
            IdCategory::Entities => &mut self.entities,
            IdCategory::ScriptVariables => &mut self.script_variables,
            IdCategory::Groups => &mut self.groups,
            IdCategory::Files => &mut self.files,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    MissingMember,
    XmlMalformed,
    InvalidId,
    IdOutOfRange,
    DuplicateId,
    UnknownGroup,
    UnknownAction,
    UnknownEntity,
    CountMismatch,
    HashMismatch,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub code: WarningCode,
    pub message: String,
    pub file_path: PathBuf,
    pub tag: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub folder: PathBuf,
    pub files_checked: usize,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn count(&self, code: WarningCode) -> usize {
        self.warnings
            .iter()
            .filter(|warning| warning.code == code)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

struct MemberSource {
    path: PathBuf,
    raw: String,
    is_root: bool,
}

struct ParsedMember<'a> {
    path: &'a Path,
    doc: Document<'a>,
    is_root: bool,
}

/// Checks every declared member of a pak folder; never fails and never writes.
pub fn validate_pak_folder(manifest: &PakManifest) -> ValidationReport {
    let mut findings = Findings::default();

    let mut sources = Vec::<MemberSource>::new();
    for (index, member) in manifest.members().iter().enumerate() {
        let path = manifest.source_path_for_member(member);
        match fs::read_to_string(&path) {
            Ok(raw) => sources.push(MemberSource {
                path,
                raw,
                is_root: index == 0,
            }),
            Err(error) => findings.push(ValidationWarning {
                code: WarningCode::MissingMember,
                message: format!("declared member {member} has no readable XML source: {error}"),
                file_path: path,
                tag: member.clone(),
                location: None,
            }),
        }
    }

    let mut members = Vec::<ParsedMember<'_>>::with_capacity(sources.len());
    for source in &sources {
        match Document::parse(&source.raw) {
            Ok(doc) => members.push(ParsedMember {
                path: &source.path,
                doc,
                is_root: source.is_root,
            }),
            Err(error) => findings.push(ValidationWarning {
                code: WarningCode::XmlMalformed,
                message: format!("malformed XML: {error}"),
                file_path: source.path.clone(),
                tag: String::new(),
                location: Some(SourceLocation {
                    line: error.pos().row as usize,
                    column: error.pos().col as usize,
                }),
            }),
        }
    }

    let mut registry = IdRegistry::default();
    for member in &members {
        collect_ids(member, &mut registry, &mut findings);
    }
    for member in &members {
        verify_group_reference(member, &registry, &mut findings);
        verify_id_usages(member, &registry, &mut findings);
        verify_sizes(member, &mut findings);
        verify_hashes(member, &mut findings);
    }

    debug!(
        folder = %manifest.folder().display(),
        files_checked = members.len(),
        actions = registry.len(IdCategory::Actions),
        entities = registry.len(IdCategory::Entities),
        script_variables = registry.len(IdCategory::ScriptVariables),
        groups = registry.len(IdCategory::Groups),
        files = registry.len(IdCategory::Files),
        warnings = findings.warnings.len(),
        "pak_validation_finished"
    );

    ValidationReport {
        folder: manifest.folder().to_path_buf(),
        files_checked: members.len(),
        warnings: findings.warnings,
    }
}

#[derive(Default)]
struct Findings {
    warnings: Vec<ValidationWarning>,
}

impl Findings {
    fn push(&mut self, warning: ValidationWarning) {
        warn!(
            code = ?warning.code,
            file = %warning.file_path.display(),
            tag = %warning.tag,
            location = ?warning.location,
            detail = %warning.message,
            "pak_validation_warning"
        );
        self.warnings.push(warning);
    }

    fn at_node(
        &mut self,
        code: WarningCode,
        message: String,
        member: &ParsedMember<'_>,
        node: Node<'_, '_>,
    ) {
        let pos = member.doc.text_pos_at(node.range().start);
        self.push(ValidationWarning {
            code,
            message,
            file_path: member.path.to_path_buf(),
            tag: node.tag_name().name().to_string(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        });
    }
}

fn collect_ids(member: &ParsedMember<'_>, registry: &mut IdRegistry, findings: &mut Findings) {
    let root = member.doc.root_element();

    if child_element(root, "id").is_some() {
        register_id(IdCategory::Files, root, member, registry, findings);
    }
    for action in child_elements(root, "action") {
        register_id(IdCategory::Actions, action, member, registry, findings);
    }
    if member.is_root {
        for group in child_elements(root, "group") {
            register_id(IdCategory::Groups, group, member, registry, findings);
        }
    }
    for layouts in descendant_elements(root, "layouts") {
        let Some(inner) = child_element(layouts, "normal")
            .and_then(|normal| child_element(normal, "layouts"))
        else {
            continue;
        };
        for value in child_elements(inner, "value") {
            register_id(IdCategory::Entities, value, member, registry, findings);
        }
    }
    for variables in descendant_elements(root, "variables") {
        for value in child_elements(variables, "value") {
            register_id(IdCategory::ScriptVariables, value, member, registry, findings);
        }
    }
}

fn register_id(
    category: IdCategory,
    node: Node<'_, '_>,
    member: &ParsedMember<'_>,
    registry: &mut IdRegistry,
    findings: &mut Findings,
) {
    let tag = node.tag_name().name();
    let Some(id) = child_hex(node, "id") else {
        findings.at_node(
            WarningCode::InvalidId,
            format!("{category} (<{tag}>) has no parseable id"),
            member,
            node,
        );
        return;
    };
    if id > u64::from(u32::MAX) {
        findings.at_node(
            WarningCode::IdOutOfRange,
            format!("{category} (<{tag}>) id 0x{id:x} is out of range"),
            member,
            node,
        );
    }
    if !registry.register(category, id) {
        findings.at_node(
            WarningCode::DuplicateId,
            format!("Duplicate {category} (<{tag}>) id 0x{id:x}"),
            member,
            node,
        );
    }
}

fn verify_group_reference(
    member: &ParsedMember<'_>,
    registry: &IdRegistry,
    findings: &mut Findings,
) {
    if member.is_root {
        return;
    }
    let root = member.doc.root_element();
    let Some(group) = child_element(root, "group") else {
        return;
    };
    let reference = match child_element(group, "id") {
        Some(id) => parse_hex(id.text()),
        None => parse_hex(group.text()),
    };
    match reference {
        Some(id) if id != 0 && !registry.contains(IdCategory::Groups, id) => findings.at_node(
            WarningCode::UnknownGroup,
            format!("references unknown group 0x{id:x}"),
            member,
            group,
        ),
        _ => {}
    }
}

fn verify_id_usages(member: &ParsedMember<'_>, registry: &IdRegistry, findings: &mut Findings) {
    let action_hash = u64::from(crc32_str(ACTION_TYPE_NAME));
    let entity_hash = u64::from(crc32_str(ENTITY_LAYOUT_TYPE_NAME));

    for elem in member.doc.root_element().descendants().filter(Node::is_element) {
        let Some(code) = child_element(elem, "code") else {
            continue;
        };
        let Some(value) = child_element(elem, "value").or_else(|| child_element(elem, "id"))
        else {
            continue;
        };
        let Some(value_id) = parse_hex(value.text()).filter(|id| *id != 0) else {
            continue;
        };
        let Some(code_id) = parse_hex(code.text()) else {
            continue;
        };

        if code_id == action_hash && !registry.contains(IdCategory::Actions, value_id) {
            findings.at_node(
                WarningCode::UnknownAction,
                format!("Action code 0x{code_id:x} references unknown action 0x{value_id:x}"),
                member,
                elem,
            );
        } else if code_id == entity_hash && !registry.contains(IdCategory::Entities, value_id) {
            findings.at_node(
                WarningCode::UnknownEntity,
                format!("Entity code 0x{code_id:x} references unknown entity 0x{value_id:x}"),
                member,
                elem,
            );
        }
    }
}

/// `size` is decimal; `count` is only checked when written as hex.
fn verify_sizes(member: &ParsedMember<'_>, findings: &mut Findings) {
    for elem in member.doc.root_element().descendants().filter(Node::is_element) {
        let children = elem.children().filter(Node::is_element).collect::<Vec<_>>();
        let marker = children
            .iter()
            .position(|child| child.has_tag_name("size"))
            .and_then(|index| {
                let text = children[index].text().map(str::trim)?;
                text.parse::<u64>().ok().map(|declared| (index, declared))
            })
            .or_else(|| {
                let index = children
                    .iter()
                    .position(|child| child.has_tag_name("count"))?;
                let text = children[index].text().map(str::trim)?;
                if !text.starts_with("0x") {
                    return None;
                }
                parse_hex(Some(text)).map(|declared| (index, declared))
            });
        let Some((index, declared)) = marker else {
            continue;
        };

        let actual = (children.len() - index - 1) as u64;
        if actual != declared {
            findings.at_node(
                WarningCode::CountMismatch,
                format!(
                    "<{}> has {actual} elements instead of {declared}",
                    elem.tag_name().name()
                ),
                member,
                elem,
            );
        }
    }
}

fn verify_hashes(member: &ParsedMember<'_>, findings: &mut Findings) {
    for elem in member.doc.root_element().descendants().filter(Node::is_element) {
        let Some(source) = elem.attribute("str") else {
            continue;
        };
        let expected = crc32_str(source);
        if parse_hex(elem.text()) == Some(u64::from(expected)) {
            continue;
        }
        findings.at_node(
            WarningCode::HashMismatch,
            format!(
                "<{}> hash mismatch ({} != crc32(\"{source}\")=0x{expected:x})",
                elem.tag_name().name(),
                elem.text().map(str::trim).unwrap_or_default()
            ),
            member,
            elem,
        );
    }
}

/// Hex text with an optional `0x` prefix; `None` when absent or unparseable.
fn parse_hex(text: Option<&str>) -> Option<u64> {
    let trimmed = text?.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn child_hex(node: Node<'_, '_>, name: &str) -> Option<u64> {
    child_element(node, name).and_then(|child| parse_hex(child.text()))
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.has_tag_name(name))
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.has_tag_name(name))
}

fn descendant_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |child| child.is_element() && child.has_tag_name(name))
}
