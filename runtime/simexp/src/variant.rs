// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Textual model-variant switch: replace one component declaration in a model's
//! source by a declaration of another type.

use std::collections::BTreeMap;
use std::ops::Range;

use simexp_base::errors::SimError;

use crate::commands::declaration;

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offsets of all occurrences of `type_name` in `source` that stand as a
/// whole (possibly package-qualified) type name.
pub fn find_type_occurrences(source: &str, type_name: &str) -> Vec<usize> {
    if type_name.is_empty() {
        return Vec::new();
    }
    source
        .match_indices(type_name)
        .filter(|(idx, _)| {
            let before = source[..*idx].chars().next_back();
            let after = source[idx + type_name.len()..].chars().next();
            !before.map_or(false, is_ident_char) && !after.map_or(false, |c| is_ident_char(c) || c == '.')
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Span of the declaration of `type_name`: from the type name through the next `;`.
///
/// Fails with `ModelTextNotFound` if the type is not declared and with
/// `AmbiguousDeclaration` if it is declared more than once.
pub fn locate_declaration(source: &str, type_name: &str, model: &str) -> Result<Range<usize>, SimError> {
    let not_found = || SimError::ModelTextNotFound {
        pattern: type_name.to_string(),
        model: model.to_string(),
    };

    let occurrences = find_type_occurrences(source, type_name);
    let start = match occurrences.as_slice() {
        [] => return Err(not_found()),
        [start] => *start,
        _ => {
            return Err(SimError::AmbiguousDeclaration {
                pattern: type_name.to_string(),
                model: model.to_string(),
                occurrences: occurrences.len(),
            })
        }
    };
    let end = source[start..].find(';').ok_or_else(not_found)? + start + 1;
    Ok(start..end)
}

/// Replace the declaration of `old_type` in `source` by
/// `<new_type> <instance_name> (<k=v,...>);`.
pub fn patch_declaration(
    source: &str,
    model: &str,
    old_type: &str,
    new_type: &str,
    instance_name: &str,
    parameters: &BTreeMap<String, String>,
) -> Result<String, SimError> {
    let span = locate_declaration(source, old_type, model)?;
    let mut patched = String::with_capacity(source.len());
    patched.push_str(&source[..span.start]);
    patched.push_str(&declaration(new_type, instance_name, parameters));
    patched.push_str(&source[span.end..]);
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "model Plant\n  Real x;\n  OldType comp (p=1);\n  Sink sink;\nequation\n  x = comp.y;\nend Plant;";

    fn params(p: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(String::from("p"), p.to_string())])
    }

    #[test]
    fn replaces_declaration_span() {
        let patched = patch_declaration(SOURCE, "Pkg.Plant", "OldType", "NewType", "comp", &params("2")).unwrap();

        assert!(patched.contains("  NewType comp (p=2);\n  Sink sink;"));
        assert!(!patched.contains("OldType"));
        assert!(patched.contains("  Real x;\n"));
        assert!(patched.ends_with("end Plant;"));
    }

    #[test]
    fn second_switch_does_not_find_old_type() {
        let patched = patch_declaration(SOURCE, "Pkg.Plant", "OldType", "NewType", "comp", &params("2")).unwrap();
        let again = patch_declaration(&patched, "Pkg.Plant", "OldType", "NewType", "comp", &params("2"));

        assert!(matches!(again, Err(SimError::ModelTextNotFound { .. })));
    }

    #[test]
    fn repeated_type_is_ambiguous() {
        let source = "model M\n  OldType a (p=1);\n  OldType b (p=2);\nend M;";
        let res = patch_declaration(source, "M", "OldType", "NewType", "a", &params("3"));

        assert!(matches!(res, Err(SimError::AmbiguousDeclaration { occurrences: 2, .. })));
    }

    #[test]
    fn longer_identifiers_do_not_match() {
        let source = "model M\n  OldTypeExt e;\n  My.OldType c;\nend M;";
        assert_eq!(find_type_occurrences(source, "OldType"), vec![source.find("OldType c").unwrap()]);
    }

    #[test]
    fn empty_parameters() {
        let patched = patch_declaration("A a;", "M", "A", "B", "b", &BTreeMap::new()).unwrap();
        assert_eq!(patched, "B b ();");
    }
}
