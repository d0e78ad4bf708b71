pub mod complaint;
pub mod identity;
pub mod ngo_response;
pub mod user;

pub use complaint::{Complaint, ComplaintStatus, Entity as ComplaintEntity, Model as ComplaintModel};
pub use identity::{Entity as Identity, Model as IdentityModel};
pub use ngo_response::{Entity as NgoResponse, Model as NgoResponseModel};
pub use user::{Entity as User, Model as UserModel, Role};
