//! Type helper utilities for syn type analysis.

/// The single generic argument of `ty` if its last path segment is one of `names`.
fn single_generic<'a>(ty: &'a syn::Type, names: &[&str]) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if !names.iter().any(|n| seg.ident == n) {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

/// Extract the inner type T from Option<T>, or return None if not an Option type.
///
/// Recognizes `Option<T>`, `std::option::Option<T>`, and `core::option::Option<T>`.
pub fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, &["Option"])
}

/// Extract the inner type T from `EntityRef<T>`.
pub fn entity_ref_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, &["EntityRef"])
}

/// Extract the inner type V from `Lazy<V>`.
pub fn lazy_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, &["Lazy"])
}

/// `Option<EntityRef<T>>` -> `T`.
pub fn single_relation_target(ty: &syn::Type) -> Option<&syn::Type> {
    option_inner(ty).and_then(entity_ref_inner)
}

/// `Vec|VecDeque|HashSet<EntityRef<T>>` -> `T`.
pub fn multi_relation_target(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, &["Vec", "VecDeque", "HashSet"])
        .and_then(entity_ref_inner)
}
