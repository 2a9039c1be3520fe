/*!

Helpers shared by the provider agents.

!*/

pub mod credentials;
