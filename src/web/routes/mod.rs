pub mod design_routes;
pub mod folder_routes;
pub mod search_routes;
pub mod tag_routes;
